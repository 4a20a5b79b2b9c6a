//! Delivery-log queries for the Notewire broker.
//!
//! One log row per admitted event. Status only ever advances:
//! pending -> delivered -> acked, each timestamp set exactly once on
//! entry into its state. `failed` exists in the schema for post-hoc
//! records of permanent rejections and is never written on the happy
//! path.

use uuid::Uuid;

use notewire_core::db::{unix_timestamp, DatabaseError};

use super::db::Database;
use super::models::DeliveryLog;

impl Database {
    /// Open a log row in `pending` alongside a freshly admitted event.
    pub async fn open_delivery_log(
        &self,
        event_id: &str,
        producer_key_id: &str,
        status_code: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO delivery_logs (id, event_id, producer_key_id, status, status_code, attempted_at) VALUES (?, ?, ?, 'pending', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(event_id)
        .bind(producer_key_id)
        .bind(status_code)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Advance `pending -> delivered`, recording which subscriber took
    /// the hand-off. Rows already past `pending` are untouched, so a
    /// broadcaster hand-off and a reconnect seed racing on one event
    /// cannot double-advance it.
    pub async fn mark_log_delivered(
        &self,
        event_id: &str,
        subscriber_key_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE delivery_logs SET status = 'delivered', delivered_at = ?, subscriber_key_id = ? WHERE event_id = ? AND status = 'pending'",
        )
        .bind(unix_timestamp())
        .bind(subscriber_key_id)
        .bind(event_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Advance `{pending, delivered} -> acked`. Idempotent.
    pub async fn mark_log_acked(&self, event_id: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE delivery_logs SET status = 'acked', acked_at = ? WHERE event_id = ? AND status IN ('pending', 'delivered')",
        )
        .bind(unix_timestamp())
        .bind(event_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// How many entries have stayed un-acked for longer than the given
    /// threshold. Drives the operator alert.
    pub async fn count_unacked_logs(&self, older_than_secs: i64) -> Result<i64, DatabaseError> {
        let cutoff = unix_timestamp() - older_than_secs;

        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM delivery_logs WHERE status IN ('pending', 'delivered') AND attempted_at < ?",
        )
        .bind(cutoff)
        .fetch_one(self.pool())
        .await?;

        Ok(row.0)
    }

    /// Fetch the log row for an event.
    pub async fn get_delivery_log(
        &self,
        event_id: &str,
    ) -> Result<Option<DeliveryLog>, DatabaseError> {
        let log = sqlx::query_as::<_, DeliveryLog>(
            "SELECT * FROM delivery_logs WHERE event_id = ?",
        )
        .bind(event_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(log)
    }
}
