//! Broker configuration, resolved once at startup.
//!
//! Every option is an environment variable with a built-in default, so a
//! bare `notewire-broker` starts on a laptop with no setup. Secrets that
//! must exist (the session signing secret) are generated when absent.

use std::path::PathBuf;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Error, Result};

/// Complete broker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP listen address, e.g. "0.0.0.0:8080".
    pub listen_addr: String,

    /// Path to the SQLite database file (the connection-pool target).
    pub db_path: PathBuf,

    /// Session signing secret, consumed by the external console
    /// collaborator. Generated fresh when not configured.
    pub signing_secret: String,

    /// Insert-time event expiry, in days.
    pub event_ttl_days: i64,

    /// Whether the expired-event reaper runs.
    pub auto_cleanup: bool,

    /// CORS origin whitelist. Empty means no cross-origin responses.
    pub allowed_origins: Vec<String>,

    /// 64 hex chars enabling payload encryption at rest; empty disables.
    pub encryption_key: String,

    /// Shared secret for HMAC-SHA256 webhook signature verification.
    pub webhook_secret: String,

    /// Whether incoming webhook signatures are verified.
    pub webhook_signature_enabled: bool,

    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            db_path: PathBuf::from("./data/notewire.db"),
            signing_secret: String::new(),
            event_ttl_days: 30,
            auto_cleanup: true,
            allowed_origins: Vec::new(),
            encryption_key: String::new(),
            webhook_secret: String::new(),
            webhook_signature_enabled: false,
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// built-in defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("NOTEWIRE_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(path) = std::env::var("NOTEWIRE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(secret) = std::env::var("NOTEWIRE_SIGNING_SECRET") {
            config.signing_secret = secret;
        }
        if let Ok(days) = std::env::var("NOTEWIRE_EVENT_TTL_DAYS") {
            config.event_ttl_days = days
                .parse()
                .map_err(|_| Error::Config(format!("invalid NOTEWIRE_EVENT_TTL_DAYS: {days}")))?;
        }
        if let Ok(val) = std::env::var("NOTEWIRE_AUTO_CLEANUP") {
            config.auto_cleanup = parse_bool(&val);
        }
        if let Ok(origins) = std::env::var("NOTEWIRE_ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(key) = std::env::var("NOTEWIRE_ENCRYPTION_KEY") {
            config.encryption_key = key;
        }
        if let Ok(secret) = std::env::var("NOTEWIRE_WEBHOOK_SECRET") {
            config.webhook_secret = secret;
        }
        if let Ok(val) = std::env::var("NOTEWIRE_WEBHOOK_SIGNATURE_ENABLED") {
            config.webhook_signature_enabled = parse_bool(&val);
        }
        if let Ok(val) = std::env::var("NOTEWIRE_LOG_JSON") {
            config.log_json = parse_bool(&val);
        }

        if config.event_ttl_days <= 0 {
            return Err(Error::Config(
                "NOTEWIRE_EVENT_TTL_DAYS must be positive".to_string(),
            ));
        }
        if config.webhook_signature_enabled && config.webhook_secret.is_empty() {
            return Err(Error::Config(
                "NOTEWIRE_WEBHOOK_SECRET is required when signature verification is enabled"
                    .to_string(),
            ));
        }

        if config.signing_secret.is_empty() {
            config.signing_secret = generate_secret();
        }

        Ok(config)
    }

    /// Event TTL in seconds, as stored on inserted rows.
    pub const fn event_ttl_secs(&self) -> i64 {
        self.event_ttl_days * 24 * 60 * 60
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "true" | "1" | "yes")
}

/// Generate a random secret for session signing.
fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_30_days() {
        let config = Config::default();
        assert_eq!(config.event_ttl_days, 30);
        assert_eq!(config.event_ttl_secs(), 30 * 24 * 60 * 60);
    }

    #[test]
    fn default_cleanup_enabled() {
        assert!(Config::default().auto_cleanup);
    }

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn generated_secret_is_64_hex_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
