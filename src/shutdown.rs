//! Shutdown coordination for the worker tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::info;

/// Shutdown controller shared between the manager and its workers.
///
/// Workers subscribe and race their blocking waits against the signal so
/// that `stop` interrupts them within one polling interval.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    signaled: Arc<AtomicBool>,
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Creates a new shutdown controller.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            signaled: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(tx),
        }
    }

    /// Signals shutdown. Idempotent.
    pub fn signal(&self) {
        if self
            .signaled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Shutdown signaled");
            let _ = self.tx.send(true);
        }
    }

    /// Returns whether shutdown has been signaled.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }

    /// Returns a receiver whose `changed()` resolves once shutdown is
    /// signaled.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
