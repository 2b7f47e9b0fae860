//! Error types for the notification pipeline.
//!
//! The pipeline never raises into the producer: every fault surfaces as a
//! counter increment and a log line. These error types travel between a
//! channel implementation and the dispatcher, which converts them into a
//! non-success delivery outcome.

use thiserror::Error;

/// Notifier error types.
#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    /// Transport-level delivery failure.
    #[error("Channel error ({channel}): {reason}")]
    ChannelError {
        /// Channel name.
        channel: String,
        /// Error reason.
        reason: String,
    },

    /// Delivery attempt exceeded the per-attempt timeout.
    #[error("Channel {channel} timed out")]
    Timeout {
        /// Channel name.
        channel: String,
    },

    /// Payload serialization error.
    #[error("Serialization error: {reason}")]
    SerializationError {
        /// Error reason.
        reason: String,
    },
}

impl NotifierError {
    /// Creates a channel error.
    #[must_use]
    pub fn channel(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChannelError {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}
