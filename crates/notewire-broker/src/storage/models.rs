//! Data models for Notewire broker storage.

use serde::{Deserialize, Serialize};

/// Role of an API key. The stored discriminator is the source of truth
/// for dispatch; the key-string prefix is cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Producer keys authorise ingest (`wh_` prefix).
    Producer,
    /// Subscriber keys authorise delivery and ACK (`ck_` prefix).
    Subscriber,
}

impl KeyRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Subscriber => "subscriber",
        }
    }

    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Producer => "wh_",
            Self::Subscriber => "ck_",
        }
    }
}

/// Delivery-log status values. Transitions are strictly one-way:
/// pending < delivered < acked; `failed` is terminal and reserved.
pub mod delivery_status {
    pub const PENDING: &str = "pending";
    pub const DELIVERED: &str = "delivered";
    pub const FAILED: &str = "failed";
    pub const ACKED: &str = "acked";
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: String,
    pub key_value: String,
    pub key_type: String,
    pub pair_id: String,
    pub is_active: i64,
    pub owner_email: Option<String>,
    pub created_at: i64,
    pub last_used: Option<i64>,
    pub usage_count: i64,
}

impl ApiKey {
    pub fn active(&self) -> bool {
        self.is_active != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub seq: i64,
    pub id: String,
    pub producer_key_id: String,
    /// Destination path, opaque to the broker beyond admission checks.
    pub path: String,
    /// Payload bytes as stored (sealed when encryption is configured).
    pub payload: Vec<u8>,
    pub processed: i64,
    pub processed_at: Option<i64>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Event {
    pub fn is_processed(&self) -> bool {
        self.processed != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryLog {
    pub id: String,
    pub event_id: String,
    pub producer_key_id: String,
    pub subscriber_key_id: Option<String>,
    pub status: String,
    pub status_code: Option<i64>,
    pub error_message: Option<String>,
    pub attempted_at: i64,
    pub delivered_at: Option<i64>,
    pub acked_at: Option<i64>,
}
