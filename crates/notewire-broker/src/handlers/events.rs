//! Event delivery: the push stream and the pull fallback.
//!
//! Both modes live on `GET /events/{subscriber_key}`. Pull (`?poll=true`)
//! answers with the current backlog as one array. Push is a long-lived
//! SSE response driven by an explicit three-phase state machine:
//!
//! - `Opening`  - emit the `: connected` comment so intermediaries open
//!   the connection end-to-end, then load the backlog.
//! - `Draining` - emit the backlog one frame at a time, advancing the
//!   delivery log per frame.
//! - `Steady`   - multiplex broadcaster hand-offs, the 30-second
//!   heartbeat, and shutdown until the channel closes or the client
//!   disconnects.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::frame::{encode_event, rfc3339};
use crate::registry::{PushRecord, Subscription};
use crate::state::AppState;
use crate::storage::{ApiKey, Event, KeyRole};

/// Comment-frame cadence in steady state.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct DeliveryQuery {
    poll: Option<String>,
}

/// One backlog entry in a pull response.
#[derive(Debug, Serialize)]
pub struct PullEvent {
    id: String,
    path: String,
    data: String,
    created_at: String,
}

/// `GET /events/{subscriber_key}` - push stream by default, pull with
/// `?poll=true`.
pub async fn handle_events(
    State(state): State<AppState>,
    Path(subscriber_key): Path<String>,
    Query(query): Query<DeliveryQuery>,
) -> Result<Response, ApiError> {
    let key = state
        .db
        .lookup_key(&subscriber_key, KeyRole::Subscriber)
        .await?
        .filter(ApiKey::active)
        .ok_or(ApiError::Unauthorized)?;

    if query.poll.as_deref() == Some("true") {
        handle_pull(state, key).await
    } else {
        Ok(handle_push(state, key))
    }
}

/// Pull mode: the unprocessed backlog for the paired producer, oldest
/// first. No server state changes; the caller is expected to ACK what it
/// applies.
async fn handle_pull(state: AppState, key: ApiKey) -> Result<Response, ApiError> {
    let events = state.db.pending_events(&key.pair_id).await?;

    let entries: Vec<PullEvent> = events
        .iter()
        .map(|event| {
            let payload = state.cipher.unseal(&event.payload);
            PullEvent {
                id: event.id.clone(),
                path: event.path.clone(),
                data: String::from_utf8_lossy(&payload).into_owned(),
                created_at: rfc3339(event.created_at),
            }
        })
        .collect();

    Ok(Json(entries).into_response())
}

enum Phase {
    Opening,
    Draining,
    Steady,
}

enum Wakeup {
    Heartbeat,
    Record(PushRecord),
    Closed,
}

/// Push mode: attach to the broadcaster and run the phase machine.
fn handle_push(state: AppState, key: ApiKey) -> Response {
    let mut subscription: Subscription = state.broadcaster.attach(&key.id);
    let subscriber_id = key.id.clone();
    let producer_id = key.pair_id.clone();
    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        let mut phase = Phase::Opening;
        let mut backlog: VecDeque<Event> = VecDeque::new();
        // First heartbeat fires one interval after connect, not immediately.
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
            HEARTBEAT_INTERVAL,
        );
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            match phase {
                Phase::Opening => {
                    yield Ok::<SseEvent, Infallible>(SseEvent::default().comment("connected"));
                    backlog = match state.db.pending_events(&producer_id).await {
                        Ok(events) => events.into(),
                        Err(e) => {
                            error!(subscriber = %subscriber_id, error = %e, "failed to load backlog");
                            VecDeque::new()
                        }
                    };
                    phase = Phase::Draining;
                }
                Phase::Draining => match backlog.pop_front() {
                    Some(event) => {
                        let payload = state.cipher.unseal(&event.payload);
                        let frame = encode_event(&event.id, &event.path, &payload, event.created_at);
                        yield Ok(SseEvent::default().data(frame));
                        if let Err(e) = state.db.mark_log_delivered(&event.id, &subscriber_id).await {
                            warn!(event = %event.id, error = %e, "failed to mark delivered");
                        }
                    }
                    None => phase = Phase::Steady,
                },
                Phase::Steady => {
                    let wakeup = tokio::select! {
                        _ = shutdown.cancelled() => Wakeup::Closed,
                        _ = heartbeat.tick() => Wakeup::Heartbeat,
                        record = subscription.receiver.recv() => {
                            record.map_or(Wakeup::Closed, Wakeup::Record)
                        }
                    };

                    match wakeup {
                        Wakeup::Heartbeat => {
                            yield Ok(SseEvent::default().comment("heartbeat"));
                        }
                        Wakeup::Record(record) => {
                            yield Ok(SseEvent::default().data(record.frame));
                            if let Err(e) = state
                                .db
                                .mark_log_delivered(&record.event_id, &subscriber_id)
                                .await
                            {
                                warn!(event = %record.event_id, error = %e, "failed to mark delivered");
                            }
                        }
                        Wakeup::Closed => {
                            info!(subscriber = %subscriber_id, "push stream closing");
                            break;
                        }
                    }
                }
            }
        }
        // Dropping `subscription` detaches the registry entry.
    };

    Sse::new(stream).into_response()
}
