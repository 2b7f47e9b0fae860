//! Reliability mechanisms for notification delivery.
//!
//! This module provides:
//! - Retry backoff with exponential delay and optional jitter
//! - Per-channel rate limiting with a cooldown window

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Retry backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound on the computed delay.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// Retry backoff policy.
///
/// Implements exponential backoff with optional jitter. The retry budget
/// itself lives on each notification (`max_attempts`); this policy only
/// computes delays.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a new retry policy with the given configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Calculates the delay before the given retry attempt.
    ///
    /// Uses exponential backoff: `delay = initial_delay * multiplier^(attempt - 1)`,
    /// capped at `max_delay`. Attempt 0 means no retry has happened yet and
    /// yields a zero delay.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(attempt as i32 - 1);

        let delay_ms = base_delay.min(self.config.max_delay.as_millis() as f64);

        let final_delay = if self.config.jitter {
            // Up to 25% jitter so retries from concurrent managers spread out
            delay_ms * (1.0 + rand_jitter() * 0.25)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0).
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

/// Per-channel delivery cooldown tracker.
///
/// Owned by the dispatcher and consulted before every delivery attempt.
/// The window is consumed by the attempt itself, not by its outcome: a
/// failed attempt still occupies the channel's next interval, which
/// intentionally throttles retries against a misbehaving channel.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_sent: HashMap<String, Instant>,
}

impl RateLimiter {
    /// Creates an empty rate limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a send to `channel` is allowed now, recording the
    /// attempt. Returns false (without recording) while the channel is
    /// inside its cooldown window.
    pub fn check_and_update(&mut self, channel: &str, min_interval: Duration) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_sent.get(channel) {
            if now.duration_since(*last) < min_interval {
                debug!(channel = %channel, "Channel is rate limited, skipping attempt");
                return false;
            }
        }
        self.last_sent.insert(channel.to_string(), now);
        true
    }
}
