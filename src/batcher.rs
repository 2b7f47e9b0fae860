//! Low-priority notification batching.
//!
//! The batcher buffers batch-eligible notifications and flushes them when
//! the buffer reaches `batch_size` or when `batch_timeout` has elapsed since
//! the last flush. The timeout is checked on a periodic tick so a flush
//! fires even with zero new arrivals. Flushed notifications are grouped by
//! `(kind, priority)` and each group is collapsed into one aggregate, which
//! re-enters the main queue flagged to bypass batching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::stats::Stats;
use crate::types::{Notification, NotificationKind, Priority};

/// Batcher worker. One per manager, consuming the batch queue.
pub(crate) struct Batcher {
    pub(crate) rx: mpsc::Receiver<Notification>,
    pub(crate) queue_tx: mpsc::Sender<Notification>,
    pub(crate) batch_size: usize,
    pub(crate) batch_timeout: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) stats: Arc<Stats>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Batcher {
    /// Runs the batching loop until shutdown is signaled or the input
    /// queue closes.
    pub(crate) async fn run(mut self) {
        let mut buffer: Vec<Notification> = Vec::new();
        let mut last_flush = Instant::now();
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            batch_size = self.batch_size,
            batch_timeout = ?self.batch_timeout,
            "Batcher started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                maybe = self.rx.recv() => match maybe {
                    Some(notification) => {
                        buffer.push(notification);
                        if buffer.len() >= self.batch_size {
                            self.flush(&mut buffer);
                            last_flush = Instant::now();
                        }
                    }
                    None => break,
                },
                _ = tick.tick() => {
                    if !buffer.is_empty() && last_flush.elapsed() >= self.batch_timeout {
                        self.flush(&mut buffer);
                        last_flush = Instant::now();
                    }
                }
            }
        }

        if !buffer.is_empty() {
            warn!(
                discarded = buffer.len(),
                "Batch buffer discarded at shutdown"
            );
        }
        info!("Batcher stopped");
    }

    /// Flushes the buffer: aggregates every group and feeds the aggregates
    /// back into the main queue.
    fn flush(&self, buffer: &mut Vec<Notification>) {
        let absorbed = buffer.len() as u64;
        let aggregates = aggregate_batch(std::mem::take(buffer));
        self.stats.record_batched(absorbed);

        for aggregate in aggregates {
            if let Err(e) = self.queue_tx.try_send(aggregate) {
                warn!(error = %e, "Main queue rejected aggregate, dropping it");
            }
        }

        debug!(absorbed, "Batch flushed");
    }
}

/// Groups a batch by `(kind, priority)` and collapses each group into one
/// aggregate notification.
///
/// The aggregate takes the highest priority in the group and concatenates
/// every member's title and body in arrival order.
fn aggregate_batch(batch: Vec<Notification>) -> Vec<Notification> {
    let mut groups: HashMap<(NotificationKind, Priority), Vec<Notification>> = HashMap::new();
    for notification in batch {
        groups
            .entry((notification.kind, notification.priority))
            .or_default()
            .push(notification);
    }

    groups
        .into_iter()
        .map(|((kind, _), members)| {
            let priority = members
                .iter()
                .map(|n| n.priority)
                .max()
                .unwrap_or(Priority::Normal);
            let title = format!("Batch Update ({} notifications)", members.len());
            let body = members
                .iter()
                .map(|n| format!("{}\n{}", n.title, n.body))
                .collect::<Vec<_>>()
                .join("\n\n");
            Notification::aggregate(kind, priority, title, body)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownController;
    use crate::types::BATCHER_SOURCE;

    fn info_notification(title: &str) -> Notification {
        Notification::new(NotificationKind::Info, Priority::Normal, title, "body")
    }

    fn warning_notification(title: &str) -> Notification {
        Notification::new(NotificationKind::Warning, Priority::Normal, title, "body")
    }

    fn spawn_batcher(
        batch_size: usize,
        batch_timeout: Duration,
    ) -> (
        mpsc::Sender<Notification>,
        mpsc::Receiver<Notification>,
        Arc<Stats>,
        ShutdownController,
    ) {
        let (batch_tx, batch_rx) = mpsc::channel(64);
        let (queue_tx, queue_rx) = mpsc::channel(64);
        let stats = Arc::new(Stats::new());
        let shutdown = ShutdownController::new();

        let batcher = Batcher {
            rx: batch_rx,
            queue_tx,
            batch_size,
            batch_timeout,
            poll_interval: Duration::from_millis(10),
            stats: Arc::clone(&stats),
            shutdown: shutdown.subscribe(),
        };
        tokio::spawn(batcher.run());

        (batch_tx, queue_rx, stats, shutdown)
    }

    #[test]
    fn test_aggregate_batch_grouping() {
        let batch = vec![
            info_notification("info 1"),
            warning_notification("warn 1"),
            info_notification("info 2"),
            info_notification("info 3"),
            warning_notification("warn 2"),
        ];

        let aggregates = aggregate_batch(batch);
        assert_eq!(aggregates.len(), 2);

        let info = aggregates
            .iter()
            .find(|a| a.kind == NotificationKind::Info)
            .expect("info aggregate");
        assert_eq!(info.title, "Batch Update (3 notifications)");
        assert_eq!(info.source, BATCHER_SOURCE);
        assert_eq!(info.attempt_count, 0);
        assert!(info.aggregated);

        // Arrival order is preserved within the aggregate body.
        let first = info.body.find("info 1").unwrap();
        let second = info.body.find("info 2").unwrap();
        let third = info.body.find("info 3").unwrap();
        assert!(first < second && second < third);

        let warning = aggregates
            .iter()
            .find(|a| a.kind == NotificationKind::Warning)
            .expect("warning aggregate");
        assert_eq!(warning.title, "Batch Update (2 notifications)");
    }

    #[test]
    fn test_aggregate_batch_empty() {
        assert!(aggregate_batch(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_flush_on_size() {
        let (batch_tx, mut queue_rx, stats, shutdown) =
            spawn_batcher(3, Duration::from_secs(60));

        for i in 0..3 {
            batch_tx
                .send(info_notification(&format!("n{i}")))
                .await
                .unwrap();
        }

        // The timeout is far away; the size trigger alone must flush.
        let aggregate = tokio::time::timeout(Duration::from_secs(1), queue_rx.recv())
            .await
            .expect("flush within deadline")
            .expect("aggregate");
        assert_eq!(aggregate.title, "Batch Update (3 notifications)");
        assert!(aggregate.aggregated);
        assert_eq!(stats.batched(), 3);

        shutdown.signal();
    }

    #[tokio::test]
    async fn test_flush_on_timeout() {
        let (batch_tx, mut queue_rx, stats, shutdown) =
            spawn_batcher(100, Duration::from_millis(50));

        batch_tx.send(info_notification("a")).await.unwrap();
        batch_tx.send(info_notification("b")).await.unwrap();

        // Far below batch_size; the timeout trigger alone must flush.
        let aggregate = tokio::time::timeout(Duration::from_secs(1), queue_rx.recv())
            .await
            .expect("flush within deadline")
            .expect("aggregate");
        assert_eq!(aggregate.title, "Batch Update (2 notifications)");
        assert_eq!(stats.batched(), 2);

        shutdown.signal();
    }

    #[tokio::test]
    async fn test_mixed_groups_flush() {
        let (batch_tx, mut queue_rx, stats, shutdown) =
            spawn_batcher(100, Duration::from_millis(50));

        for i in 0..3 {
            batch_tx
                .send(info_notification(&format!("info {i}")))
                .await
                .unwrap();
        }
        for i in 0..2 {
            batch_tx
                .send(warning_notification(&format!("warn {i}")))
                .await
                .unwrap();
        }

        let mut aggregates = Vec::new();
        for _ in 0..2 {
            let aggregate = tokio::time::timeout(Duration::from_secs(1), queue_rx.recv())
                .await
                .expect("flush within deadline")
                .expect("aggregate");
            aggregates.push(aggregate);
        }

        assert_eq!(aggregates.len(), 2);
        assert_eq!(stats.batched(), 5);
        assert!(
            tokio::time::timeout(Duration::from_millis(100), queue_rx.recv())
                .await
                .is_err(),
            "exactly two aggregates expected"
        );

        shutdown.signal();
    }

    #[tokio::test]
    async fn test_shutdown_discards_buffer() {
        let (batch_tx, mut queue_rx, stats, shutdown) =
            spawn_batcher(100, Duration::from_secs(60));

        batch_tx.send(info_notification("pending")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        shutdown.signal();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Nothing was flushed and the buffered notification is gone.
        assert!(queue_rx.try_recv().is_err());
        assert_eq!(stats.batched(), 0);
    }
}
