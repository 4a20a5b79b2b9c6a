//! Health, readiness, and service-info endpoints.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /health` - liveness with a DB round-trip.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    match state.db.ping().await {
        Ok(()) => {
            let latency = started.elapsed();
            Json(json!({
                "status": "ok",
                "database": "connected",
                "db_latency_ms": latency.as_millis() as u64,
                "uptime_secs": state.started_at.elapsed().as_secs(),
            }))
            .into_response()
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "database": "disconnected",
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}

/// `GET /ready` - readiness for load balancers.
pub async fn readiness(State(state): State<AppState>) -> Response {
    match state.db.ping().await {
        Ok(()) => Json(json!({ "ready": true })).into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false })),
        )
            .into_response(),
    }
}

/// `GET /info` - service identity and counters.
pub async fn service_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "notewire-broker",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "connected_subscribers": state.broadcaster.connection_count(),
    }))
}
