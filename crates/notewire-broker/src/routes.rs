//! HTTP route definitions.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{ack, events, health, webhook};
use crate::middleware::{rate_limit, signature};
use crate::state::AppState;

/// Build the complete broker router.
///
/// ## Public
/// - `GET /health` - liveness + DB ping
/// - `GET /ready` - readiness
/// - `GET /info` - service info
///
/// ## Key-authenticated (key in path)
/// - `POST /webhook/{producer_key}?path=<p>` - ingest one event
/// - `POST /test/{subscriber_key}` - synthetic event to the paired producer
/// - `GET /events/{subscriber_key}` - push stream, or pull with `?poll=true`
/// - `POST /ack/{subscriber_key}/{event_id}` - acknowledge one event
pub fn build_router(state: AppState) -> Router {
    // Ingest carries the admission middleware. Layer order: the rate
    // limiter runs before signature verification, both before the handler.
    let ingest = Router::new()
        .route("/webhook/{producer_key}", post(webhook::handle_webhook))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            signature::verify,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/info", get(health::service_info))
        .route("/test/{subscriber_key}", post(webhook::handle_test_webhook))
        .route("/events/{subscriber_key}", get(events::handle_events))
        .route(
            "/ack/{subscriber_key}/{event_id}",
            post(ack::handle_ack),
        )
        .merge(ingest)
        .with_state(state)
}
