//! Per-key ingest rate limiting.
//!
//! Token bucket per producer key string: steady 100 requests/minute with
//! a burst of 20. Buckets are created lazily on first use and removed by
//! a background sweep once idle for ten minutes. A shared fallback bucket
//! covers requests where no key is present, since the limiter runs before
//! key resolution.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Steady-state request rate per key.
pub const REQUESTS_PER_MINUTE: u32 = 100;

/// Cold-bucket burst allowance.
pub const BURST: u32 = 20;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Idle age at which a bucket is reclaimed.
pub const BUCKET_IDLE_MAX: Duration = Duration::from_secs(10 * 60);

/// Bucket key used when no producer key is present on the request.
const GLOBAL_BUCKET: &str = "__global__";

struct BucketEntry {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    last_seen: Instant,
}

impl BucketEntry {
    fn new(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::direct(quota),
            last_seen: Instant::now(),
        }
    }
}

/// Lazily populated registry of per-key token buckets.
pub struct RateLimiterRegistry {
    buckets: DashMap<String, BucketEntry>,
    quota: Quota,
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::with_rate(REQUESTS_PER_MINUTE, BURST)
    }

    pub fn with_rate(per_minute: u32, burst: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        Self {
            buckets: DashMap::new(),
            quota: Quota::per_minute(per_minute).allow_burst(burst),
        }
    }

    /// Non-blocking admission check for one request on the given key.
    pub fn check(&self, key: &str) -> bool {
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| BucketEntry::new(self.quota));
        entry.last_seen = Instant::now();
        entry.limiter.check().is_ok()
    }

    /// Drop buckets idle for longer than `max_idle`.
    pub fn sweep(&self, max_idle: Duration) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, entry| entry.last_seen.elapsed() <= max_idle);
        let removed = before - self.buckets.len();
        if removed > 0 {
            debug!(removed, "swept idle rate-limit buckets");
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Axum middleware enforcing the per-key bucket on the ingest route.
pub async fn enforce(
    State(state): State<AppState>,
    key: Option<Path<String>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bucket_key = key
        .as_ref()
        .map_or(GLOBAL_BUCKET, |Path(value)| value.as_str());

    if !state.limiter.check(bucket_key) {
        debug!(key = %bucket_key, "rate limit exceeded");
        return Err(ApiError::TooManyRequests);
    }

    Ok(next.run(request).await)
}

/// Background sweep reclaiming idle buckets.
pub async fn sweep_task(limiter: Arc<RateLimiterRegistry>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("rate-limit sweep stopped");
                return;
            }
            _ = interval.tick() => {
                limiter.sweep(BUCKET_IDLE_MAX);
            }
        }
    }
}
