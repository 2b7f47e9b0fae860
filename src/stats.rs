//! Delivery statistics.
//!
//! Counters are updated by their owning worker (or the producer, for
//! `queued`) and read externally as a point-in-time snapshot. Readers may
//! observe a slightly stale value.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic delivery counters shared between the manager and its workers.
#[derive(Debug, Default)]
pub struct Stats {
    queued: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    batched: AtomicU64,
}

impl Stats {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful enqueue.
    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a notification delivered to at least one channel.
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an all-channels delivery failure.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records notifications absorbed into aggregates.
    pub fn record_batched(&self, count: u64) {
        self.batched.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the number of notifications accepted into the queue.
    #[must_use]
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    /// Returns the number of notifications delivered to at least one channel.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Returns the number of all-channels delivery failures.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Returns the number of notifications absorbed into aggregates.
    #[must_use]
    pub fn batched(&self) -> u64 {
        self.batched.load(Ordering::Relaxed)
    }
}

/// Point-in-time statistics snapshot returned by
/// [`crate::NotificationManager::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Notifications accepted into the main queue.
    pub queued: u64,
    /// Notifications delivered to at least one channel.
    pub sent: u64,
    /// All-channels delivery failures (one per failed cycle).
    pub failed: u64,
    /// Notifications absorbed into batch aggregates.
    pub batched: u64,
    /// Current depth of the main queue.
    pub queue_depth: u64,
    /// Names of currently enabled channels, sorted.
    pub enabled_channels: Vec<String>,
}
