//! Event acknowledgement.
//!
//! The pivot of at-most-once application: the subscriber applies its
//! local effect first, then ACKs. The ACK itself is aggressively
//! idempotent, so a retry whose original response was lost cannot cause a
//! spurious side effect.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::{ApiKey, KeyRole};

#[derive(Debug, Serialize)]
pub struct AckResponse {
    status: &'static str,
    event_id: String,
}

/// `POST /ack/{subscriber_key}/{event_id}` - mark one event applied.
pub async fn handle_ack(
    State(state): State<AppState>,
    Path((subscriber_key, event_id)): Path<(String, String)>,
) -> Result<Json<AckResponse>, ApiError> {
    let event_id = Uuid::parse_str(&event_id)
        .map_err(|_| ApiError::BadRequest("invalid event_id format"))?
        .to_string();

    let key = state
        .db
        .lookup_key(&subscriber_key, KeyRole::Subscriber)
        .await?
        .filter(ApiKey::active)
        .ok_or(ApiError::Unauthorized)?;

    let event = state
        .db
        .get_event(&event_id)
        .await?
        .ok_or(ApiError::NotFound("event not found"))?;

    // A subscriber may only acknowledge events addressed to its pair.
    if event.producer_key_id != key.pair_id {
        return Err(ApiError::Forbidden("event does not belong to this key"));
    }

    state.db.mark_event_processed(&event_id).await?;
    if let Err(e) = state.db.mark_log_acked(&event_id).await {
        warn!(event = %event_id, error = %e, "failed to mark delivery log acked");
    }

    debug!(event = %event_id, subscriber = %key.id, "event acknowledged");

    Ok(Json(AckResponse {
        status: "acknowledged",
        event_id,
    }))
}
