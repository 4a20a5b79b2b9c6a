//! Ingest admission: the producer-facing webhook endpoint and the
//! subscriber-facing test endpoint.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::frame::encode_event;
use crate::registry::PushRecord;
use crate::state::AppState;
use crate::storage::{ApiKey, KeyRole};

/// Destination path byte cap.
pub const MAX_PATH_BYTES: usize = 512;

/// Payload byte cap.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Synthetic payload emitted by the test endpoint.
const TEST_PAYLOAD: &[u8] = br#"{"test":true,"source":"notewire"}"#;
const TEST_PATH: &str = "_test/connection-test.md";
const TEST_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Deserialize)]
pub struct IngestQuery {
    path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    status: &'static str,
    event_id: String,
}

/// `POST /webhook/{producer_key}?path=<p>` - admit one event.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(producer_key): Path<String>,
    Query(query): Query<IngestQuery>,
    body: Body,
) -> Result<Json<IngestResponse>, ApiError> {
    let key = state
        .db
        .lookup_key(&producer_key, KeyRole::Producer)
        .await?
        .filter(ApiKey::active)
        .ok_or(ApiError::Unauthorized)?;

    let path = validate_path(query.path.as_deref())?;

    // Read through the cap regardless of Content-Length; crossing it
    // rejects the request before anything is written.
    let payload = axum::body::to_bytes(body, MAX_PAYLOAD_BYTES + 1)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }

    let sealed = state.cipher.seal(&payload)?;
    let event = state
        .db
        .insert_event(&key.id, path, &sealed, state.config.event_ttl_secs())
        .await?;

    if let Err(e) = state.db.open_delivery_log(&event.id, &key.id, 200).await {
        warn!(event = %event.id, error = %e, "failed to open delivery log");
    }

    debug!(event = %event.id, producer = %key.id, bytes = payload.len(), "event admitted");

    touch_usage_stats(&state, key.id.clone());
    hand_off(&state, &key.id, &event.id, path, &payload, event.created_at);

    Ok(Json(IngestResponse {
        status: "ok",
        event_id: event.id,
    }))
}

/// `POST /test/{subscriber_key}` - emit a synthetic event to the paired
/// producer identity, so a plugin can verify the full flow without
/// knowing the producer key.
pub async fn handle_test_webhook(
    State(state): State<AppState>,
    Path(subscriber_key): Path<String>,
) -> Result<Json<IngestResponse>, ApiError> {
    let key = state
        .db
        .lookup_key(&subscriber_key, KeyRole::Subscriber)
        .await?
        .filter(ApiKey::active)
        .ok_or(ApiError::Unauthorized)?;

    let producer_id = key.pair_id.clone();
    let sealed = state.cipher.seal(TEST_PAYLOAD)?;
    let event = state
        .db
        .insert_event(&producer_id, TEST_PATH, &sealed, TEST_TTL_SECS)
        .await?;

    if let Err(e) = state
        .db
        .open_delivery_log(&event.id, &producer_id, 200)
        .await
    {
        warn!(event = %event.id, error = %e, "failed to open delivery log");
    }

    // The paired subscriber is the caller; no pair resolution needed.
    let frame = encode_event(&event.id, TEST_PATH, TEST_PAYLOAD, event.created_at);
    state.broadcaster.broadcast(
        &key.id,
        PushRecord {
            event_id: event.id.clone(),
            producer_key_id: producer_id,
            frame,
        },
    );

    Ok(Json(IngestResponse {
        status: "ok",
        event_id: event.id,
    }))
}

fn validate_path(path: Option<&str>) -> Result<&str, ApiError> {
    let path = path.ok_or(ApiError::BadRequest("path query parameter is required"))?;
    if path.is_empty() {
        return Err(ApiError::BadRequest("path query parameter is required"));
    }
    if path.len() > MAX_PATH_BYTES {
        return Err(ApiError::BadRequest("path too long (max 512 bytes)"));
    }
    if path.contains("..") {
        return Err(ApiError::BadRequest(
            "invalid path (parent traversal not allowed)",
        ));
    }
    Ok(path)
}

/// Update key usage stats off the request path; failures are logged and
/// swallowed.
fn touch_usage_stats(state: &AppState, key_id: String) {
    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(e) = db.touch_key(&key_id).await {
            warn!(key = %key_id, error = %e, "failed to update key usage stats");
        }
    });
}

/// Resolve the paired subscriber and offer the record to its stream.
/// Fire-and-forget: delivery correctness rests on the store, not on this
/// hand-off.
fn hand_off(
    state: &AppState,
    producer_id: &str,
    event_id: &str,
    path: &str,
    payload: &[u8],
    created_at: i64,
) {
    let db = state.db.clone();
    let broadcaster = state.broadcaster.clone();
    let producer_id = producer_id.to_string();
    let frame = encode_event(event_id, path, payload, created_at);
    let event_id = event_id.to_string();

    tokio::spawn(async move {
        match db.pair_subscriber(&producer_id).await {
            Ok(Some(subscriber)) => {
                broadcaster.broadcast(
                    &subscriber.id,
                    PushRecord {
                        event_id,
                        producer_key_id: producer_id,
                        frame,
                    },
                );
            }
            Ok(None) => {
                debug!(producer = %producer_id, "no live subscriber pair, skipping hand-off");
            }
            Err(e) => {
                warn!(producer = %producer_id, error = %e, "pair resolution failed");
            }
        }
    });
}
