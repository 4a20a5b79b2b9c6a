//! Event queue queries for the Notewire broker.

use uuid::Uuid;

use notewire_core::db::{unix_timestamp, DatabaseError};

use super::db::Database;
use super::models::Event;

impl Database {
    /// Insert an event. The payload is stored exactly as given (the
    /// admission layer seals it first when encryption is configured).
    pub async fn insert_event(
        &self,
        producer_key_id: &str,
        path: &str,
        payload: &[u8],
        ttl_secs: i64,
    ) -> Result<Event, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO events (id, producer_key_id, path, payload, processed, created_at, expires_at) VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(producer_key_id)
        .bind(path)
        .bind(payload)
        .bind(now)
        .bind(now + ttl_secs)
        .execute(self.pool())
        .await?;

        self.get_event(&id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Event {id}")))
    }

    /// Get an event by ID.
    pub async fn get_event(&self, id: &str) -> Result<Option<Event>, DatabaseError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(event)
    }

    /// Unprocessed events for a producer, in insertion order. Seeds a
    /// newly connected push stream and answers pull requests.
    pub async fn pending_events(
        &self,
        producer_key_id: &str,
    ) -> Result<Vec<Event>, DatabaseError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE producer_key_id = ? AND processed = 0 ORDER BY created_at ASC, seq ASC",
        )
        .bind(producer_key_id)
        .fetch_all(self.pool())
        .await?;

        Ok(events)
    }

    /// Mark an event processed. Idempotent: returns whether this call
    /// performed the transition.
    pub async fn mark_event_processed(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE events SET processed = 1, processed_at = ? WHERE id = ? AND processed = 0",
        )
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a single event.
    pub async fn delete_event(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete all events past their expiry, processed or not. Returns the
    /// count removed; delivery logs go with their events via FK cascade.
    pub async fn delete_expired_events(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM events WHERE expires_at < ?")
            .bind(unix_timestamp())
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
