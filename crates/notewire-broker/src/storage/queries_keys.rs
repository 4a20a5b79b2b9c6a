//! API key queries for the Notewire broker.

use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use notewire_core::db::{unix_timestamp, DatabaseError};

use super::db::Database;
use super::models::{ApiKey, KeyRole};

/// Generate a key string: role prefix plus 32 bytes of entropy as hex.
fn generate_key_value(role: KeyRole) -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", role.prefix(), hex::encode(bytes))
}

impl Database {
    // =========================================================================
    // Lookup
    // =========================================================================

    /// Look up a key by its wire value and expected role.
    ///
    /// Returns the row even when inactive; callers collapse "unknown",
    /// "inactive", and "wrong role" into one authorisation failure so the
    /// response never reveals which check tripped.
    pub async fn lookup_key(
        &self,
        key_value: &str,
        role: KeyRole,
    ) -> Result<Option<ApiKey>, DatabaseError> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE key_value = ? AND key_type = ?",
        )
        .bind(key_value)
        .bind(role.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(key)
    }

    /// Get a key by ID.
    pub async fn get_key(&self, id: &str) -> Result<ApiKey, DatabaseError> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Key {id}")))
    }

    /// Resolve the live subscriber key paired with a producer, if any.
    pub async fn pair_subscriber(
        &self,
        producer_id: &str,
    ) -> Result<Option<ApiKey>, DatabaseError> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE pair_id = ? AND key_type = 'subscriber' AND is_active = 1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(producer_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(key)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a producer/subscriber key pair in a single transaction.
    ///
    /// The producer's `pair_id` is its own id; the subscriber's `pair_id`
    /// references the producer.
    pub async fn create_key_pair(
        &self,
        owner_email: Option<&str>,
    ) -> Result<(ApiKey, ApiKey), DatabaseError> {
        let producer_id = Uuid::new_v4().to_string();
        let subscriber_id = Uuid::new_v4().to_string();
        let producer_key = generate_key_value(KeyRole::Producer);
        let subscriber_key = generate_key_value(KeyRole::Subscriber);
        let now = unix_timestamp();

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO api_keys (id, key_value, key_type, pair_id, is_active, owner_email, created_at, usage_count) VALUES (?, ?, 'producer', ?, 1, ?, ?, 0)",
        )
        .bind(&producer_id)
        .bind(&producer_key)
        .bind(&producer_id)
        .bind(owner_email)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO api_keys (id, key_value, key_type, pair_id, is_active, owner_email, created_at, usage_count) VALUES (?, ?, 'subscriber', ?, 1, ?, ?, 0)",
        )
        .bind(&subscriber_id)
        .bind(&subscriber_key)
        .bind(&producer_id)
        .bind(owner_email)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let producer = self.get_key(&producer_id).await?;
        let subscriber = self.get_key(&subscriber_id).await?;
        Ok((producer, subscriber))
    }

    /// Deactivate both halves of a key pair in one write, scoped to the
    /// owning email so one tenant cannot revoke another's keys.
    pub async fn deactivate_pair(
        &self,
        pair_id: &str,
        owner_email: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE api_keys SET is_active = 0 WHERE pair_id = ? AND owner_email = ? AND is_active = 1",
        )
        .bind(pair_id)
        .bind(owner_email)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Usage stats
    // =========================================================================

    /// Update `last_used` and bump the usage counter for a key.
    pub async fn touch_key(&self, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE api_keys SET last_used = ?, usage_count = usage_count + 1 WHERE id = ?")
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
