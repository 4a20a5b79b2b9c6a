//! In-memory subscriber registry for push delivery.
//!
//! The registry owns only the channel senders; each streaming task holds
//! its receiver as the sole consumer. Hand-off is `try_send` on a small
//! bounded channel: a full channel drops the record, because the event is
//! already durable and will reach the subscriber through its next pull or
//! reconnect. Sends never block admission.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Per-subscriber hand-off channel capacity.
pub const CHANNEL_CAPACITY: usize = 10;

/// A record handed to a connected subscriber's stream: the frame is
/// pre-encoded at admission so the streaming task only writes it out.
#[derive(Debug, Clone)]
pub struct PushRecord {
    pub event_id: String,
    pub producer_key_id: String,
    pub frame: String,
}

struct PushChannel {
    sender: mpsc::Sender<PushRecord>,
    conn_id: u64,
    attached_at: Instant,
}

/// Thread-safe registry of connected subscriber streams.
#[derive(Clone, Default)]
pub struct Broadcaster {
    channels: Arc<RwLock<HashMap<String, PushChannel>>>,
    next_conn_id: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber stream, displacing any existing one for the
    /// same identity. Displacement drops the old sender out of the
    /// registry, so the displaced stream's receiver observes closure on
    /// its next read and terminates cleanly.
    ///
    /// Returns the receiver plus a guard that detaches the entry when the
    /// stream is dropped.
    pub fn attach(&self, subscriber_key_id: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        let displaced = self.channels.write().insert(
            subscriber_key_id.to_string(),
            PushChannel {
                sender,
                conn_id,
                attached_at: Instant::now(),
            },
        );
        if displaced.is_some() {
            info!(subscriber = %subscriber_key_id, "displaced previous subscriber stream");
        } else {
            info!(subscriber = %subscriber_key_id, "subscriber stream attached");
        }

        Subscription {
            receiver,
            _guard: DetachGuard {
                registry: self.clone(),
                subscriber_key_id: subscriber_key_id.to_string(),
                conn_id,
            },
        }
    }

    /// Remove a subscriber's entry, but only the registration identified
    /// by `conn_id`: a displaced stream must not detach its successor.
    fn detach(&self, subscriber_key_id: &str, conn_id: u64) {
        let mut channels = self.channels.write();
        if channels
            .get(subscriber_key_id)
            .is_some_and(|ch| ch.conn_id == conn_id)
        {
            channels.remove(subscriber_key_id);
            info!(subscriber = %subscriber_key_id, "subscriber stream detached");
        }
    }

    /// Offer a record to a subscriber's stream without blocking. A full
    /// or missing channel drops the record; the store keeps the event.
    pub fn broadcast(&self, subscriber_key_id: &str, record: PushRecord) {
        let channels = self.channels.read();
        let Some(channel) = channels.get(subscriber_key_id) else {
            debug!(subscriber = %subscriber_key_id, "no connected stream, skipping hand-off");
            return;
        };

        match channel.sender.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                debug!(
                    subscriber = %subscriber_key_id,
                    event = %record.event_id,
                    "push channel full, dropping frame"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Stream is tearing down; its guard removes the entry.
                debug!(subscriber = %subscriber_key_id, "push channel closed");
            }
        }
    }

    /// Whether a subscriber currently has a stream attached.
    pub fn is_connected(&self, subscriber_key_id: &str) -> bool {
        self.channels.read().contains_key(subscriber_key_id)
    }

    /// Number of attached subscriber streams.
    pub fn connection_count(&self) -> usize {
        self.channels.read().len()
    }

    /// How long the given subscriber's stream has been attached.
    pub fn attached_for(&self, subscriber_key_id: &str) -> Option<std::time::Duration> {
        self.channels
            .read()
            .get(subscriber_key_id)
            .map(|ch| ch.attached_at.elapsed())
    }
}

/// A live subscriber stream registration: the receiving half of the
/// hand-off channel plus the drop guard that unregisters it.
pub struct Subscription {
    pub receiver: mpsc::Receiver<PushRecord>,
    _guard: DetachGuard,
}

struct DetachGuard {
    registry: Broadcaster,
    subscriber_key_id: String,
    conn_id: u64,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        self.registry.detach(&self.subscriber_key_id, self.conn_id);
    }
}
