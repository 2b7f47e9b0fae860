//! # Sirocco
//!
//! Asynchronous notification engine for trading bots.
//!
//! This crate provides:
//! - Non-blocking, bounded notification queuing with backpressure
//! - Priority- and kind-aware batching of low-priority notifications
//! - Concurrent fan-out to pluggable delivery channels
//! - Per-channel rate limiting
//! - Exponential-backoff retries with a bounded retry budget
//! - Delivery statistics and graceful shutdown
//!
//! # Architecture
//!
//! ```text
//!  producers ──enqueue──▶ main queue ──▶ dispatcher ──fan-out──▶ channels
//!                            ▲               │
//!                            │          batch-eligible
//!                       aggregates           │
//!                            │               ▼
//!                            └────────── batcher
//! ```
//!
//! Producers hand notifications to [`NotificationManager::enqueue`], which
//! never blocks and never surfaces delivery failures back into trading
//! logic. The dispatcher worker drains the main queue: batch-eligible
//! notifications detour through the batcher, everything else fans out
//! concurrently to every enabled channel that is not rate limited. When
//! every channel fails, the retry policy re-enqueues the notification with
//! exponential backoff until its retry budget is exhausted.
//!
//! # Channels
//!
//! Delivery targets implement [`NotificationChannel`]:
//! - [`TelegramChannel`] - Telegram Bot API messages
//! - [`EmailChannel`] - SendGrid transactional email
//! - [`InMemoryChannel`] - In-process buffer for tests and dry runs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sirocco::{NotificationManager, NotifierConfig, TelegramChannel, TradeEvent};
//!
//! # async fn run() {
//! let manager = NotificationManager::new(NotifierConfig::default());
//! manager.register_channel(Arc::new(TelegramChannel::new("bot-token", "chat-id")));
//! manager.start();
//!
//! manager.notify_trade(TradeEvent::buy("BTCUSDT", 42_000.0, 0.5));
//!
//! manager.stop().await;
//! # }
//! ```

#![warn(missing_docs)]

mod batcher;
pub mod channel;
pub mod config;
mod dispatcher;
pub mod error;
pub mod manager;
pub mod reliability;
pub mod shutdown;
pub mod stats;
pub mod types;

pub use channel::{
    CHAT_MIN_INTERVAL, EMAIL_MIN_INTERVAL, EmailChannel, InMemoryChannel, NotificationChannel,
    TelegramChannel,
};
pub use config::NotifierConfig;
pub use error::NotifierError;
pub use manager::NotificationManager;
pub use reliability::{RateLimiter, RetryConfig, RetryPolicy};
pub use shutdown::ShutdownController;
pub use stats::{Stats, StatsSnapshot};
pub use types::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_SOURCE, Notification, NotificationId, NotificationKind,
    Priority, TradeEvent, TradeSide,
};
