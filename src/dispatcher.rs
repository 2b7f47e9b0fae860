//! Dispatcher worker.
//!
//! Single consumer of the main queue. For each notification it either hands
//! off to the batcher (batch-eligible notifications) or fans out to every
//! enabled, unblocked channel concurrently, evaluates the outcome and
//! triggers the retry policy on an all-channels failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::channel::NotificationChannel;
use crate::error::NotifierError;
use crate::reliability::{RateLimiter, RetryPolicy};
use crate::stats::Stats;
use crate::types::Notification;

/// Dispatcher worker. One per manager, consuming the main queue.
pub(crate) struct Dispatcher {
    pub(crate) rx: mpsc::Receiver<Notification>,
    /// Main-queue sender, used to re-enqueue retried notifications.
    pub(crate) queue_tx: mpsc::Sender<Notification>,
    pub(crate) batch_tx: mpsc::Sender<Notification>,
    pub(crate) channels: Arc<RwLock<HashMap<String, Arc<dyn NotificationChannel>>>>,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) send_timeout: Duration,
    pub(crate) stats: Arc<Stats>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    /// Runs the dispatch loop until shutdown is signaled or the main queue
    /// closes.
    pub(crate) async fn run(mut self) {
        info!("Dispatcher started");

        loop {
            // The retry backoff may have consumed the watch notification,
            // so the latched value is checked as well.
            if *self.shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = self.shutdown.changed() => break,
                maybe = self.rx.recv() => match maybe {
                    Some(notification) => self.process(notification).await,
                    None => break,
                },
            }
        }

        info!("Dispatcher stopped");
    }

    /// Processes one dequeued notification.
    async fn process(&mut self, notification: Notification) {
        let notification = if notification.should_batch() {
            match self.batch_tx.try_send(notification) {
                Ok(()) => return,
                // Degrade to an immediate send rather than dropping.
                Err(TrySendError::Full(n)) => {
                    warn!(
                        notification_id = %n.id,
                        "Batch queue full, sending immediately"
                    );
                    n
                }
                Err(TrySendError::Closed(n)) => n,
            }
        } else {
            notification
        };

        if self.fan_out(&notification).await {
            self.stats.record_sent();
            debug!(notification_id = %notification.id, "Notification sent");
        } else {
            self.stats.record_failed();
            self.handle_failure(notification).await;
        }
    }

    /// Attempts delivery on every enabled, unblocked channel concurrently.
    ///
    /// Returns true if at least one channel succeeded. An empty attempt set
    /// (every channel disabled or rate limited) counts as a failure so the
    /// retry policy still engages.
    async fn fan_out(&mut self, notification: &Notification) -> bool {
        let channels: Vec<Arc<dyn NotificationChannel>> =
            self.channels.read().values().cloned().collect();

        let mut attempts = Vec::new();
        for channel in channels {
            if !channel.is_enabled() {
                debug!(
                    channel = %channel.name(),
                    notification_id = %notification.id,
                    "Channel disabled, skipping"
                );
                continue;
            }
            if !self
                .rate_limiter
                .check_and_update(channel.name(), channel.min_interval())
            {
                continue;
            }
            attempts.push(channel);
        }

        let send_timeout = self.send_timeout;
        let sends = attempts.into_iter().map(|channel| async move {
            let outcome = tokio::time::timeout(send_timeout, channel.send(notification)).await;
            (channel, outcome)
        });

        let mut delivered = 0usize;
        for (channel, outcome) in join_all(sends).await {
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(
                    channel = %channel.name(),
                    notification_id = %notification.id,
                    error = %e,
                    "Channel delivery failed"
                ),
                Err(_) => {
                    let e = NotifierError::Timeout {
                        channel: channel.name().to_string(),
                    };
                    warn!(
                        channel = %channel.name(),
                        notification_id = %notification.id,
                        error = %e,
                        "Channel delivery timed out"
                    );
                }
            }
        }

        delivered > 0
    }

    /// Applies the retry policy after an all-channels failure.
    ///
    /// The backoff sleep runs inline in the dispatch loop, which throttles
    /// the whole pipeline while a retry is pending; the sleep is raced
    /// against the shutdown signal so `stop` is still honored promptly.
    async fn handle_failure(&mut self, mut notification: Notification) {
        if notification.retries_exhausted() {
            error!(
                notification_id = %notification.id,
                attempts = notification.attempt_count,
                max_attempts = notification.max_attempts,
                "Notification dropped after exhausting retry budget"
            );
            return;
        }

        notification.attempt_count += 1;
        let delay = self.retry_policy.delay_for_attempt(notification.attempt_count);
        debug!(
            notification_id = %notification.id,
            attempt = notification.attempt_count,
            delay = ?delay,
            "Scheduling retry"
        );

        tokio::select! {
            _ = self.shutdown.changed() => return,
            () = tokio::time::sleep(delay) => {}
        }

        let id = notification.id.clone();
        if self.queue_tx.try_send(notification).is_err() {
            // Retry budget is not preserved across a full-queue rejection.
            error!(
                notification_id = %id,
                "Main queue full, dropping retried notification"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InMemoryChannel;
    use crate::channel::testing::FailingChannel;
    use crate::reliability::RetryConfig;
    use crate::shutdown::ShutdownController;
    use crate::types::{NotificationKind, Priority, TradeEvent};

    struct Harness {
        queue_tx: mpsc::Sender<Notification>,
        batch_rx: mpsc::Receiver<Notification>,
        channels: Arc<RwLock<HashMap<String, Arc<dyn NotificationChannel>>>>,
        stats: Arc<Stats>,
        shutdown: ShutdownController,
    }

    fn spawn_dispatcher() -> Harness {
        spawn_dispatcher_with_retry(RetryConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        })
    }

    fn spawn_dispatcher_with_retry(retry: RetryConfig) -> Harness {
        let (queue_tx, queue_rx) = mpsc::channel(64);
        let (batch_tx, batch_rx) = mpsc::channel(64);
        let channels = Arc::new(RwLock::new(HashMap::new()));
        let stats = Arc::new(Stats::new());
        let shutdown = ShutdownController::new();

        let dispatcher = Dispatcher {
            rx: queue_rx,
            queue_tx: queue_tx.clone(),
            batch_tx,
            channels: Arc::clone(&channels),
            rate_limiter: RateLimiter::new(),
            retry_policy: RetryPolicy::new(retry),
            send_timeout: Duration::from_secs(1),
            stats: Arc::clone(&stats),
            shutdown: shutdown.subscribe(),
        };
        tokio::spawn(dispatcher.run());

        Harness {
            queue_tx,
            batch_rx,
            channels,
            stats,
            shutdown,
        }
    }

    fn register(harness: &Harness, channel: Arc<dyn NotificationChannel>) {
        harness
            .channels
            .write()
            .insert(channel.name().to_string(), channel);
    }

    async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_direct_send_success() {
        let harness = spawn_dispatcher();
        let channel = Arc::new(InMemoryChannel::new(16));
        register(&harness, channel.clone());

        let notification = TradeEvent::buy("BTCUSDT", 42_000.0, 0.5).into_notification();
        harness.queue_tx.send(notification).await.unwrap();

        let stats = Arc::clone(&harness.stats);
        assert!(wait_until(Duration::from_secs(2), || stats.sent() == 1).await);
        assert_eq!(harness.stats.failed(), 0);
        assert_eq!(channel.notification_count(), 1);

        harness.shutdown.signal();
    }

    #[tokio::test]
    async fn test_batch_eligible_routed_to_batcher() {
        let mut harness = spawn_dispatcher();
        let channel = Arc::new(InMemoryChannel::new(16));
        register(&harness, channel.clone());

        let notification = Notification::new(
            NotificationKind::Info,
            Priority::Normal,
            "Info",
            "body",
        );
        harness.queue_tx.send(notification).await.unwrap();

        let routed = tokio::time::timeout(Duration::from_secs(1), harness.batch_rx.recv())
            .await
            .expect("routed to batcher")
            .expect("notification");
        assert_eq!(routed.kind, NotificationKind::Info);

        // Not fanned out directly.
        assert_eq!(harness.stats.sent(), 0);
        assert_eq!(channel.notification_count(), 0);

        harness.shutdown.signal();
    }

    #[tokio::test]
    async fn test_partial_success_counts_as_sent() {
        let harness = spawn_dispatcher();
        let good = Arc::new(InMemoryChannel::named("good", 16));
        let bad = Arc::new(FailingChannel::new("bad"));
        register(&harness, good.clone());
        register(&harness, bad);

        let notification = TradeEvent::sell("ETHUSDT", 3_000.0, 1.0).into_notification();
        harness.queue_tx.send(notification).await.unwrap();

        let stats = Arc::clone(&harness.stats);
        assert!(wait_until(Duration::from_secs(2), || stats.sent() == 1).await);
        assert_eq!(harness.stats.failed(), 0);
        assert_eq!(good.notification_count(), 1);

        harness.shutdown.signal();
    }

    #[tokio::test]
    async fn test_rate_limited_skip_counts_as_failure() {
        let harness = spawn_dispatcher();
        let channel =
            Arc::new(InMemoryChannel::new(16).with_min_interval(Duration::from_secs(60)));
        register(&harness, channel.clone());

        let first = TradeEvent::buy("BTCUSDT", 42_000.0, 0.5).into_notification();
        // Zero retry budget so the failure is terminal and observable.
        let second = TradeEvent::buy("BTCUSDT", 42_100.0, 0.5)
            .into_notification()
            .with_max_attempts(0);

        harness.queue_tx.send(first).await.unwrap();
        harness.queue_tx.send(second).await.unwrap();

        let stats = Arc::clone(&harness.stats);
        assert!(
            wait_until(Duration::from_secs(2), || {
                stats.sent() == 1 && stats.failed() == 1
            })
            .await
        );
        assert_eq!(channel.notification_count(), 1);

        harness.shutdown.signal();
    }

    #[tokio::test]
    async fn test_always_failing_channel_exhausts_retries() {
        let harness = spawn_dispatcher();
        register(&harness, Arc::new(FailingChannel::new("bad")));

        let notification = TradeEvent::buy("BTCUSDT", 42_000.0, 0.5).into_notification();
        let max_attempts = notification.max_attempts;
        harness.queue_tx.send(notification).await.unwrap();

        // Initial attempt plus max_attempts retries each record a failure.
        let expected = u64::from(max_attempts) + 1;
        let stats = Arc::clone(&harness.stats);
        assert!(
            wait_until(Duration::from_secs(5), || stats.failed() == expected).await,
            "failed = {}",
            harness.stats.failed()
        );

        // Terminal drop: no further attempts happen.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(harness.stats.failed(), expected);
        assert_eq!(harness.stats.sent(), 0);

        harness.shutdown.signal();
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff_halts_dispatcher() {
        // A long backoff keeps the dispatcher inside the retry sleep while
        // shutdown fires.
        let harness = spawn_dispatcher_with_retry(RetryConfig {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        });
        register(&harness, Arc::new(FailingChannel::new("bad")));

        let notification = TradeEvent::buy("BTCUSDT", 42_000.0, 0.5).into_notification();
        harness.queue_tx.send(notification).await.unwrap();

        let stats = Arc::clone(&harness.stats);
        assert!(wait_until(Duration::from_secs(2), || stats.failed() == 1).await);

        // Signaled while the retry sleep is pending.
        harness.shutdown.signal();

        // A deliverable notification enqueued after the signal must never
        // reach a channel: the worker has to exit instead of resuming the
        // dispatch loop.
        let good = Arc::new(InMemoryChannel::named("good", 16));
        register(&harness, good.clone());
        let late = TradeEvent::sell("ETHUSDT", 3_000.0, 1.0).into_notification();
        harness.queue_tx.send(late).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(good.notification_count(), 0);
        assert_eq!(harness.stats.sent(), 0);
        assert_eq!(harness.stats.failed(), 1);
    }
}
