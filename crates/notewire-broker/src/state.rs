//! Shared application state available to all request handlers.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use notewire_core::Config;
use notewire_crypto::PayloadCipher;

use crate::middleware::rate_limit::RateLimiterRegistry;
use crate::registry::Broadcaster;
use crate::storage::Database;

#[derive(Clone)]
pub struct AppState {
    /// Broker database (keys, events, delivery logs).
    pub db: Database,

    /// Payload-at-rest cipher; pass-through when no key is configured.
    pub cipher: Arc<PayloadCipher>,

    /// Registry of connected subscriber streams.
    pub broadcaster: Broadcaster,

    /// Per-key ingest token buckets.
    pub limiter: Arc<RateLimiterRegistry>,

    /// Application configuration.
    pub config: Arc<Config>,

    /// Cancelled on shutdown; observed by streams and workers.
    pub shutdown: CancellationToken,

    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Database, cipher: PayloadCipher, config: Config) -> Self {
        Self {
            db,
            cipher: Arc::new(cipher),
            broadcaster: Broadcaster::new(),
            limiter: Arc::new(RateLimiterRegistry::new()),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }
}
