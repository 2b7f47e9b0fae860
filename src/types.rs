//! Notification types and structures.
//!
//! This module defines the core notification record that flows through the
//! delivery pipeline, along with its kind and priority enumerations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default origin label for producer-created notifications.
pub const DEFAULT_SOURCE: &str = "trading_bot";

/// Origin label stamped on aggregates synthesized by the batcher.
pub const BATCHER_SOURCE: &str = "notification_manager";

/// Default retry budget for a notification.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unique identifier for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    /// Creates a `NotificationId` from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique `NotificationId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NotificationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of event a notification communicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A position was opened.
    TradeEntry,
    /// A position was closed.
    TradeExit,
    /// An open position changed (partial fill, TP/SL adjustment).
    TradeUpdate,
    /// An error occurred somewhere in the bot.
    Error,
    /// A non-fatal condition worth surfacing.
    Warning,
    /// Informational message.
    Info,
    /// System lifecycle message (startup, shutdown, reconnect).
    System,
    /// Periodic performance summary.
    Performance,
}

impl NotificationKind {
    /// All notification kinds, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::TradeEntry,
        Self::TradeExit,
        Self::TradeUpdate,
        Self::Error,
        Self::Warning,
        Self::Info,
        Self::System,
        Self::Performance,
    ];

    /// Returns true for the trade lifecycle kinds that must never be batched.
    #[must_use]
    pub const fn is_trade_event(&self) -> bool {
        matches!(self, Self::TradeEntry | Self::TradeExit)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TradeEntry => write!(f, "trade_entry"),
            Self::TradeExit => write!(f, "trade_exit"),
            Self::TradeUpdate => write!(f, "trade_update"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
            Self::System => write!(f, "system"),
            Self::Performance => write!(f, "performance"),
        }
    }
}

/// Notification priority level.
///
/// Ordering follows the declaration order: `Low < Normal < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background noise, safe to batch and delay.
    Low,
    /// Default priority.
    Normal,
    /// Time-sensitive, delivered without batching delay.
    High,
    /// Must reach the operator as fast as possible.
    Critical,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Self; 4] = [Self::Low, Self::Normal, Self::High, Self::Critical];

    /// Returns the priority as its numeric ordinal (low = 1).
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Normal => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One event to communicate to external channels.
///
/// Created by a producer, queued by the manager, optionally absorbed into an
/// aggregate by the batcher, and attempted against every enabled channel by
/// the dispatcher. Ends in exactly one terminal state: sent (at least one
/// channel succeeded) or dropped (retry budget exhausted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier, used in engine log lines.
    pub id: NotificationId,
    /// Kind of event.
    pub kind: NotificationKind,
    /// Priority level.
    pub priority: Priority,
    /// Short headline.
    pub title: String,
    /// Message body.
    pub body: String,
    /// Opaque structured payload (symbol, price, pnl, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    /// Creation timestamp, immutable after construction.
    pub created_at: DateTime<Utc>,
    /// Free-text origin label.
    pub source: String,
    /// Number of retries performed so far. Never exceeds `max_attempts`.
    pub attempt_count: u32,
    /// Retry budget.
    pub max_attempts: u32,
    /// Set on aggregates synthesized by the batcher; aggregates are never
    /// re-batched.
    #[serde(default)]
    pub aggregated: bool,
}

impl Notification {
    /// Creates a new notification.
    #[must_use]
    pub fn new(
        kind: NotificationKind,
        priority: Priority,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: NotificationId::generate(),
            kind,
            priority,
            title: title.into(),
            body: body.into(),
            attributes: Map::new(),
            created_at: Utc::now(),
            source: DEFAULT_SOURCE.to_string(),
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            aggregated: false,
        }
    }

    /// Creates an aggregate notification on behalf of the batcher.
    ///
    /// Aggregates carry a fresh retry budget and bypass batching eligibility.
    #[must_use]
    pub(crate) fn aggregate(
        kind: NotificationKind,
        priority: Priority,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let mut notification = Self::new(kind, priority, title, body);
        notification.source = BATCHER_SOURCE.to_string();
        notification.aggregated = true;
        notification
    }

    /// Adds an attribute to the payload.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets the origin label.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Returns true if this notification is eligible for batching.
    ///
    /// Critical notifications and trade entry/exit events always bypass the
    /// batcher: timeliness matters more than volume reduction for them.
    /// Aggregates synthesized by the batcher are never batched again.
    #[must_use]
    pub fn should_batch(&self) -> bool {
        if self.aggregated {
            return false;
        }
        if self.priority == Priority::Critical {
            return false;
        }
        !self.kind.is_trade_event()
    }

    /// Returns true if the retry budget is exhausted.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

/// Side of a trade, used by the convenience trade-notification API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    /// Buy / long entry.
    Buy,
    /// Sell / exit.
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Trade fill details for [`crate::NotificationManager::notify_trade`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Trading symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: TradeSide,
    /// Fill price.
    pub price: f64,
    /// Fill quantity.
    pub quantity: f64,
    /// Entry price, for exits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,
    /// Profit/loss percentage, for exits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    /// Exit type tag (TP/SL), for exits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_type: Option<String>,
}

impl TradeEvent {
    /// Creates a buy-side trade event.
    #[must_use]
    pub fn buy(symbol: impl Into<String>, price: f64, quantity: f64) -> Self {
        Self::new(symbol, TradeSide::Buy, price, quantity)
    }

    /// Creates a sell-side trade event.
    #[must_use]
    pub fn sell(symbol: impl Into<String>, price: f64, quantity: f64) -> Self {
        Self::new(symbol, TradeSide::Sell, price, quantity)
    }

    /// Creates a trade event.
    #[must_use]
    pub fn new(symbol: impl Into<String>, side: TradeSide, price: f64, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            price,
            quantity,
            entry_price: None,
            pnl: None,
            exit_type: None,
        }
    }

    /// Sets the entry price.
    #[must_use]
    pub fn with_entry_price(mut self, entry_price: f64) -> Self {
        self.entry_price = Some(entry_price);
        self
    }

    /// Sets the profit/loss percentage.
    #[must_use]
    pub fn with_pnl(mut self, pnl: f64) -> Self {
        self.pnl = Some(pnl);
        self
    }

    /// Sets the exit type tag.
    #[must_use]
    pub fn with_exit_type(mut self, exit_type: impl Into<String>) -> Self {
        self.exit_type = Some(exit_type.into());
        self
    }

    /// Builds the notification for this trade event.
    #[must_use]
    pub(crate) fn into_notification(self) -> Notification {
        let (kind, title, body) = match self.side {
            TradeSide::Buy => (
                NotificationKind::TradeEntry,
                format!("Buy Order: {}", self.symbol),
                format!("Buy {} {} at {}", self.quantity, self.symbol, self.price),
            ),
            TradeSide::Sell => {
                let mut body =
                    format!("Sell {} {} at {}", self.quantity, self.symbol, self.price);
                if let Some(pnl) = self.pnl {
                    body.push_str(&format!(" (PnL: {pnl:.2}%)"));
                }
                if let Some(ref exit_type) = self.exit_type {
                    body.push_str(&format!(" ({exit_type})"));
                }
                (
                    NotificationKind::TradeExit,
                    format!("Sell Order: {}", self.symbol),
                    body,
                )
            }
        };

        let mut notification = Notification::new(kind, Priority::High, title, body)
            .with_attribute("symbol", self.symbol)
            .with_attribute("side", self.side.to_string())
            .with_attribute("price", self.price)
            .with_attribute("quantity", self.quantity);
        if let Some(entry_price) = self.entry_price {
            notification = notification.with_attribute("entry_price", entry_price);
        }
        if let Some(pnl) = self.pnl {
            notification = notification.with_attribute("pnl", pnl);
        }
        if let Some(exit_type) = self.exit_type {
            notification = notification.with_attribute("exit_type", exit_type);
        }
        notification
    }
}
