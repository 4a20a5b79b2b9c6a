//! Background reaper for expired events.
//!
//! Wakes daily, deletes every event past its expiry (processed or not:
//! retention is time-bounded, not work-bounded), and surfaces the
//! un-acked backlog count as an operator alert. Opt-in via
//! configuration; when disabled, expired events accumulate and the
//! operator prunes manually.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::storage::Database;

/// How often the reaper sweeps.
pub const REAP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Age past which an un-acked delivery is worth an operator alert.
pub const UNACKED_ALERT_AGE_SECS: i64 = 60 * 60;

pub async fn run(db: Database, cancel: CancellationToken) {
    let mut interval = tokio::time::interval_at(
        tokio::time::Instant::now() + REAP_INTERVAL,
        REAP_INTERVAL,
    );
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("reaper started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("reaper stopped");
                return;
            }
            _ = interval.tick() => {
                sweep(&db).await;
            }
        }
    }
}

/// One reap cycle: delete expired events, report stuck deliveries.
pub async fn sweep(db: &Database) {
    match db.delete_expired_events().await {
        Ok(0) => {}
        Ok(removed) => info!(removed, "reaped expired events"),
        Err(e) => error!(error = %e, "reap failed"),
    }

    match db.count_unacked_logs(UNACKED_ALERT_AGE_SECS).await {
        Ok(0) => {}
        Ok(stuck) => warn!(
            stuck,
            older_than_secs = UNACKED_ALERT_AGE_SECS,
            "events delivered but not acknowledged"
        ),
        Err(e) => error!(error = %e, "undelivered count failed"),
    }
}
