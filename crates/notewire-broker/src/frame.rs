//! Wire encoding of events for delivery.
//!
//! Both delivery modes present an event as the same JSON object:
//! `{id, path, data, created_at}`, where `data` is the payload decoded as
//! a UTF-8 string (lossily, so binary payloads still travel) and
//! `created_at` is RFC 3339.

use serde_json::json;

/// Encode one event as its delivery JSON.
pub fn encode_event(id: &str, path: &str, payload: &[u8], created_at: i64) -> String {
    json!({
        "id": id,
        "path": path,
        "data": String::from_utf8_lossy(payload),
        "created_at": rfc3339(created_at),
    })
    .to_string()
}

/// Render a Unix timestamp as RFC 3339 with second precision.
pub fn rfc3339(unix_secs: i64) -> String {
    chrono::DateTime::from_timestamp(unix_secs, 0)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_default()
}
