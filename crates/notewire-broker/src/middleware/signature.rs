//! Optional HMAC-SHA256 webhook signature verification.
//!
//! When enabled, ingest requests must carry `X-Webhook-Signature` with
//! the hex HMAC of the raw body under the shared secret (a `sha256=`
//! prefix is tolerated). Verification buffers the body once and hands it
//! back to the handler unchanged.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::error::ApiError;
use crate::handlers::webhook::MAX_PAYLOAD_BYTES;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub async fn verify(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.webhook_signature_enabled {
        return Ok(next.run(request).await);
    }

    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .ok_or(ApiError::Unauthorized)?;

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_PAYLOAD_BYTES + 1)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;

    if !signature_matches(&bytes, &signature, &state.config.webhook_secret) {
        debug!("webhook signature mismatch");
        return Err(ApiError::Unauthorized);
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

/// Constant-time comparison of the claimed signature against the HMAC of
/// the body.
fn signature_matches(body: &Bytes, signature: &str, secret: &str) -> bool {
    let claimed = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(claimed_bytes) = hex::decode(claimed) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&claimed_bytes).is_ok()
}
