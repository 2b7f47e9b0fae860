//! Notification channel implementations.
//!
//! A channel is a named, enable/disable-able sink capable of attempting
//! delivery of one notification. The dispatcher reads `is_enabled` fresh on
//! every attempt and converts any send error into a non-success outcome, so
//! a misbehaving transport can never destabilize the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use tracing::debug;

use crate::error::NotifierError;
use crate::types::{Notification, NotificationKind};

/// Default cooldown between sends on chat-style channels.
pub const CHAT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default cooldown between sends on email-style channels.
pub const EMAIL_MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Notification delivery sink.
///
/// Implementations wrap a concrete transport and map notification kinds to
/// transport-specific formatting as they see fit. The engine only requires a
/// success/failure outcome per attempt.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Returns the channel name, unique within a registry.
    fn name(&self) -> &str;

    /// Attempts delivery of one notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be delivered. The
    /// dispatcher logs the error and counts the attempt as a non-success;
    /// it never propagates further.
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError>;

    /// Returns whether the channel currently accepts deliveries.
    fn is_enabled(&self) -> bool;

    /// Enables the channel.
    fn enable(&self);

    /// Disables the channel. Disabled channels are skipped during fan-out.
    fn disable(&self);

    /// Minimum interval between delivery attempts on this channel.
    fn min_interval(&self) -> Duration;
}

// ---------------------------------------------------------------------------
// Telegram
// ---------------------------------------------------------------------------

/// Telegram bot channel.
///
/// Delivers notifications as chat messages via the Telegram bot API.
pub struct TelegramChannel {
    name: String,
    token: String,
    chat_id: String,
    min_interval: Duration,
    client: reqwest::Client,
    enabled: AtomicBool,
}

impl TelegramChannel {
    /// Creates a new Telegram channel.
    #[must_use]
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            name: "telegram".to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
            min_interval: CHAT_MIN_INTERVAL,
            client: reqwest::Client::new(),
            enabled: AtomicBool::new(true),
        }
    }

    /// Overrides the per-channel cooldown.
    #[must_use]
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Formats a notification as a chat message.
    fn format_message(notification: &Notification) -> String {
        let mut message = format!("{}\n{}", notification.title, notification.body);
        if matches!(
            notification.kind,
            NotificationKind::TradeEntry | NotificationKind::TradeExit
        ) {
            for (key, value) in &notification.attributes {
                message.push_str(&format!("\n{key}: {value}"));
            }
        }
        message
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": Self::format_message(notification),
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifierError::channel(&self.name, e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::channel(
                &self.name,
                format!("HTTP {}", response.status()),
            ));
        }

        debug!(
            channel = %self.name,
            notification_id = %notification.id,
            "Notification delivered via Telegram"
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// Email channel.
///
/// Delivers notifications as plain-text mail via the SendGrid v3 API.
pub struct EmailChannel {
    name: String,
    api_key: String,
    sender: String,
    receiver: String,
    min_interval: Duration,
    client: reqwest::Client,
    enabled: AtomicBool,
}

impl EmailChannel {
    /// Creates a new email channel.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
    ) -> Self {
        Self {
            name: "email".to_string(),
            api_key: api_key.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            min_interval: EMAIL_MIN_INTERVAL,
            client: reqwest::Client::new(),
            enabled: AtomicBool::new(true),
        }
    }

    /// Overrides the per-channel cooldown.
    #[must_use]
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Formats the mail body, appending structured attributes when present.
    fn format_body(notification: &Notification) -> Result<String, NotifierError> {
        if notification.attributes.is_empty() {
            return Ok(notification.body.clone());
        }
        let attributes = serde_json::to_string_pretty(&notification.attributes)
            .map_err(|e| NotifierError::SerializationError {
                reason: e.to_string(),
            })?;
        Ok(format!("{}\n\n{attributes}", notification.body))
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        let payload = json!({
            "personalizations": [{"to": [{"email": self.receiver}]}],
            "from": {"email": self.sender},
            "subject": notification.title,
            "content": [{
                "type": "text/plain",
                "value": Self::format_body(notification)?,
            }],
        });

        let response = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifierError::channel(&self.name, e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::channel(
                &self.name,
                format!("HTTP {}", response.status()),
            ));
        }

        debug!(
            channel = %self.name,
            notification_id = %notification.id,
            "Notification delivered via email"
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// In-memory notification channel for testing and local development.
///
/// Stores delivered notifications in memory for verification. Keeps at most
/// `buffer_size` notifications, discarding the oldest on overflow.
pub struct InMemoryChannel {
    name: String,
    notifications: Arc<RwLock<Vec<Notification>>>,
    buffer_size: usize,
    min_interval: Duration,
    enabled: AtomicBool,
}

impl InMemoryChannel {
    /// Creates a new in-memory channel named `in_memory`.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self::named("in_memory", buffer_size)
    }

    /// Creates a new in-memory channel with an explicit name.
    #[must_use]
    pub fn named(name: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            name: name.into(),
            notifications: Arc::new(RwLock::new(Vec::with_capacity(buffer_size))),
            buffer_size,
            min_interval: Duration::ZERO,
            enabled: AtomicBool::new(true),
        }
    }

    /// Overrides the per-channel cooldown (zero by default).
    #[must_use]
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Returns the number of notifications stored.
    #[must_use]
    pub fn notification_count(&self) -> usize {
        self.notifications.read().len()
    }

    /// Returns a copy of all stored notifications.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().clone()
    }

    /// Clears all stored notifications.
    pub fn clear(&self) {
        self.notifications.write().clear();
    }
}

impl Clone for InMemoryChannel {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            notifications: Arc::clone(&self.notifications),
            buffer_size: self.buffer_size,
            min_interval: self.min_interval,
            enabled: AtomicBool::new(self.enabled.load(Ordering::Relaxed)),
        }
    }
}

#[async_trait]
impl NotificationChannel for InMemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        let mut notifications = self.notifications.write();
        if notifications.len() >= self.buffer_size {
            notifications.remove(0);
        }
        notifications.push(notification.clone());
        debug!(
            channel = %self.name,
            notification_id = %notification.id,
            stored = notifications.len(),
            "Notification stored in memory"
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
