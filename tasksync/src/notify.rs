//! User-facing notifications.
//!
//! The engine reports external changes and conflicts through a [`Notifier`].
//! Delivery is fire-and-forget: a notifier must never block or fail the
//! caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Something changed; no action needed.
    Info,
    /// Local work was overridden.
    Warning,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity.
    pub level: NotificationLevel,
    /// Rendered text.
    pub text: String,
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    /// Reports an informational message.
    fn notify_info(&self, text: &str);

    /// Reports a warning.
    fn notify_warning(&self, text: &str);
}

/// Forwards notifications into a bounded channel.
///
/// If the receiver falls behind and the channel is full, new notifications
/// are dropped with a debug log.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    /// Creates the notifier and the receiver the UI drains.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    fn send(&self, level: NotificationLevel, text: &str) {
        let notification = Notification {
            level,
            text: text.to_string(),
        };
        if let Err(err) = self.tx.try_send(notification) {
            tracing::debug!(%level, %err, "notification dropped");
        }
    }
}

impl Notifier for ChannelNotifier {
    fn notify_info(&self, text: &str) {
        self.send(NotificationLevel::Info, text);
    }

    fn notify_warning(&self, text: &str) {
        self.send(NotificationLevel::Warning, text);
    }
}
