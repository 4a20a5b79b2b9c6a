//! API error types and response formatting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use notewire_core::db::DatabaseError;
use notewire_crypto::CryptoError;

/// API error type that converts to the broker's HTTP taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing, unknown, inactive, or wrong-role key; bad signature.
    /// Deliberately carries no detail about which check failed.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but the resource belongs to someone else.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// Malformed path, query, or identifier.
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    /// Body exceeded the 10 MiB cap.
    #[error("payload too large (max 10MB)")]
    PayloadTooLarge,

    /// Per-key token bucket exhausted.
    #[error("rate limit exceeded")]
    TooManyRequests,

    /// Unknown identifier.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Store unreachable or a write failed; the caller may retry.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Payload sealing failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// JSON error response body. Terse and machine-readable; payload content
/// is never echoed back.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            Self::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                "forbidden",
                Some((*msg).to_string()),
            ),
            Self::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                Some((*msg).to_string()),
            ),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                Some("payload too large (max 10MB)".to_string()),
            ),
            Self::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                Some("too many requests for this key, try again later".to_string()),
            ),
            Self::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "not_found",
                Some((*msg).to_string()),
            ),
            Self::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some("an internal error occurred".to_string()),
                )
            }
            Self::Crypto(err) => {
                tracing::error!(error = %err, "crypto error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some("an internal error occurred".to_string()),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
