//! Notification manager.
//!
//! Owns the queues, the channel registry and the worker lifecycle, and
//! exposes the producer-facing API. Producers enqueue without ever blocking
//! on network I/O: `enqueue` rejects when the bounded queue is full instead
//! of stalling the caller, and no delivery fault is ever raised back into
//! producer code.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::batcher::Batcher;
use crate::channel::NotificationChannel;
use crate::config::NotifierConfig;
use crate::dispatcher::Dispatcher;
use crate::reliability::{RateLimiter, RetryPolicy};
use crate::shutdown::ShutdownController;
use crate::stats::{Stats, StatsSnapshot};
use crate::types::{Notification, NotificationKind, Priority, TradeEvent};

/// Asynchronous notification manager.
///
/// Constructed once by application startup code and shared by handle with
/// producers; there is deliberately no process-wide global instance.
pub struct NotificationManager {
    config: NotifierConfig,
    channels: Arc<RwLock<HashMap<String, Arc<dyn NotificationChannel>>>>,
    stats: Arc<Stats>,
    queue_tx: mpsc::Sender<Notification>,
    queue_rx: Mutex<Option<mpsc::Receiver<Notification>>>,
    batch_tx: mpsc::Sender<Notification>,
    batch_rx: Mutex<Option<mpsc::Receiver<Notification>>>,
    shutdown: ShutdownController,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    closed: AtomicBool,
}

impl NotificationManager {
    /// Creates a new manager with the given configuration.
    ///
    /// Workers are not spawned until [`start`](Self::start) is called;
    /// notifications enqueued before that simply wait in the queue.
    #[must_use]
    pub fn new(config: NotifierConfig) -> Self {
        let capacity = config.max_queue_size.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        let (batch_tx, batch_rx) = mpsc::channel(capacity);

        Self {
            config,
            channels: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(Stats::new()),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            batch_tx,
            batch_rx: Mutex::new(Some(batch_rx)),
            shutdown: ShutdownController::new(),
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Starts the dispatcher and batcher workers. Idempotent.
    ///
    /// A manager cannot be restarted after [`stop`](Self::stop); construct a
    /// new one instead.
    pub fn start(&self) {
        if self.closed.load(Ordering::SeqCst) {
            warn!("Notification manager cannot be restarted after stop");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Notification manager already running");
            return;
        }

        let queue_rx = self.queue_rx.lock().take();
        let batch_rx = self.batch_rx.lock().take();
        let (Some(queue_rx), Some(batch_rx)) = (queue_rx, batch_rx) else {
            warn!("Notification manager cannot be restarted after stop");
            self.running.store(false, Ordering::SeqCst);
            return;
        };

        let dispatcher = Dispatcher {
            rx: queue_rx,
            queue_tx: self.queue_tx.clone(),
            batch_tx: self.batch_tx.clone(),
            channels: Arc::clone(&self.channels),
            rate_limiter: RateLimiter::new(),
            retry_policy: RetryPolicy::new(self.config.retry.clone()),
            send_timeout: self.config.send_timeout,
            stats: Arc::clone(&self.stats),
            shutdown: self.shutdown.subscribe(),
        };

        let batcher = Batcher {
            rx: batch_rx,
            queue_tx: self.queue_tx.clone(),
            batch_size: self.config.batch_size,
            batch_timeout: self.config.batch_timeout,
            poll_interval: self.config.poll_interval,
            stats: Arc::clone(&self.stats),
            shutdown: self.shutdown.subscribe(),
        };

        let mut handles = self.handles.lock();
        handles.push(tokio::spawn(dispatcher.run()));
        handles.push(tokio::spawn(batcher.run()));

        info!("Notification manager started");
    }

    /// Stops both workers. Idempotent.
    ///
    /// Signals shutdown, waits up to `shutdown_timeout` per worker and
    /// aborts any worker that does not finish in time. After `stop`,
    /// [`enqueue`](Self::enqueue) fails fast without panicking.
    pub async fn stop(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.signal();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for mut handle in handles {
            if tokio::time::timeout(self.config.shutdown_timeout, &mut handle)
                .await
                .is_err()
            {
                warn!("Worker did not stop within timeout, aborting it");
                handle.abort();
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Notification manager stopped");
    }

    /// Appends a notification to the main queue without blocking.
    ///
    /// Returns `false` when the queue is at capacity or the manager has been
    /// stopped; the notification is dropped in both cases. On success the
    /// `queued` counter is incremented.
    pub fn enqueue(&self, notification: Notification) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            debug!(
                notification_id = %notification.id,
                "Manager is stopped, rejecting notification"
            );
            return false;
        }

        match self.queue_tx.try_send(notification) {
            Ok(()) => {
                self.stats.record_queued();
                true
            }
            Err(TrySendError::Full(n)) => {
                warn!(
                    notification_id = %n.id,
                    "Notification queue full, dropping notification"
                );
                false
            }
            Err(TrySendError::Closed(n)) => {
                warn!(
                    notification_id = %n.id,
                    "Notification queue closed, dropping notification"
                );
                false
            }
        }
    }

    /// Builds and enqueues a notification.
    pub fn notify(
        &self,
        kind: NotificationKind,
        priority: Priority,
        title: impl Into<String>,
        body: impl Into<String>,
        attributes: Map<String, Value>,
        source: impl Into<String>,
    ) -> bool {
        let mut notification = Notification::new(kind, priority, title, body)
            .with_source(source)
            .with_max_attempts(self.config.max_attempts);
        notification.attributes = attributes;
        self.enqueue(notification)
    }

    /// Enqueues a trade notification.
    ///
    /// Buys become `trade_entry`, sells become `trade_exit`; both carry
    /// `high` priority and therefore bypass batching.
    pub fn notify_trade(&self, trade: TradeEvent) -> bool {
        let notification = trade
            .into_notification()
            .with_max_attempts(self.config.max_attempts);
        self.enqueue(notification)
    }

    /// Enqueues an error notification at `critical` priority.
    pub fn notify_error(&self, message: impl Into<String>, source: impl Into<String>) -> bool {
        let notification = Notification::new(
            NotificationKind::Error,
            Priority::Critical,
            "Error Alert",
            message,
        )
        .with_source(source)
        .with_max_attempts(self.config.max_attempts);
        self.enqueue(notification)
    }

    /// Registers a channel, replacing any existing channel with the same
    /// name.
    pub fn register_channel(&self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        self.channels.write().insert(name.clone(), channel);
        info!(channel = %name, "Channel registered");
    }

    /// Enables a registered channel.
    pub fn enable_channel(&self, name: &str) {
        match self.channels.read().get(name) {
            Some(channel) => channel.enable(),
            None => warn!(channel = %name, "Cannot enable unknown channel"),
        }
    }

    /// Disables a registered channel. Disabled channels are skipped during
    /// fan-out but still count toward the all-channels-failed determination.
    pub fn disable_channel(&self, name: &str) {
        match self.channels.read().get(name) {
            Some(channel) => channel.disable(),
            None => warn!(channel = %name, "Cannot disable unknown channel"),
        }
    }

    /// Returns a point-in-time statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        let mut enabled_channels: Vec<String> = self
            .channels
            .read()
            .values()
            .filter(|c| c.is_enabled())
            .map(|c| c.name().to_string())
            .collect();
        enabled_channels.sort();

        let queue_depth =
            (self.queue_tx.max_capacity() - self.queue_tx.capacity()) as u64;

        StatsSnapshot {
            queued: self.stats.queued(),
            sent: self.stats.sent(),
            failed: self.stats.failed(),
            batched: self.stats.batched(),
            queue_depth,
            enabled_channels,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}
