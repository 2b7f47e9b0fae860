//! Notification manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reliability::RetryConfig;

/// Notification manager configuration.
///
/// All fields have defaults; the struct deserializes from an application
/// config section with any subset of fields present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Number of buffered notifications that triggers a batch flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum age of the batch buffer before a flush fires.
    #[serde(default = "default_batch_timeout", with = "humantime_serde")]
    pub batch_timeout: Duration,
    /// Main queue capacity; `enqueue` rejects once this is reached.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Retry budget for producer-created notifications.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Batcher polling cadence; also bounds how quickly workers observe
    /// a stop signal.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Per-attempt channel send timeout.
    #[serde(default = "default_send_timeout", with = "humantime_serde")]
    pub send_timeout: Duration,
    /// Bounded wait for worker completion during `stop`.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Retry backoff configuration.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout: default_batch_timeout(),
            max_queue_size: default_max_queue_size(),
            max_attempts: default_max_attempts(),
            poll_interval: default_poll_interval(),
            send_timeout: default_send_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            retry: RetryConfig::default(),
        }
    }
}
