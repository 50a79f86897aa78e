//! Notification channels for alert delivery.
//!
//! This module provides the [`NotificationService`] trait, implemented once
//! per channel, and [`LogChannel`], a channel that writes alerts to the
//! tracing log.

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::types::{Alert, AlertSeverity};

/// A notification channel.
///
/// Implement this trait to deliver alerts through email, chat, paging or
/// any other service. Implementations must not block; `send` is awaited
/// with a timeout by the dispatcher.
pub trait NotificationService: Send + Sync {
    /// Returns the channel id this service handles.
    fn channel(&self) -> &str;

    /// Returns true if this service is ready to send.
    ///
    /// Unconfigured services are skipped by the dispatcher.
    fn is_configured(&self) -> bool {
        true
    }

    /// Delivers an alert.
    ///
    /// Resolves to `Ok(true)` when the alert was delivered and `Ok(false)`
    /// when the remote side declined it.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::NotificationFailed` if the delivery fails.
    fn send<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<bool>>;
}

/// A channel that logs notifications.
///
/// Critical and error alerts are logged at `ERROR`, warnings at `WARN` and
/// informational alerts at `INFO`.
#[derive(Debug, Clone)]
pub struct LogChannel {
    channel: String,
    enabled: bool,
}

impl LogChannel {
    /// Creates a new log channel handling `channel`.
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            enabled: true,
        }
    }

    /// Sets whether the channel is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn log(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::Error => error!(
                channel = %self.channel,
                alert_id = %alert.id,
                alert = %alert.name,
                source = %alert.source,
                severity = %alert.severity,
                value = %alert.value,
                "ALERT"
            ),
            AlertSeverity::Warning => warn!(
                channel = %self.channel,
                alert_id = %alert.id,
                alert = %alert.name,
                source = %alert.source,
                value = %alert.value,
                "ALERT"
            ),
            AlertSeverity::Info => info!(
                channel = %self.channel,
                alert_id = %alert.id,
                alert = %alert.name,
                source = %alert.source,
                value = %alert.value,
                "ALERT"
            ),
        }
        debug!(channel = %self.channel, context = ?alert.context, "alert context");
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new("log")
    }
}

impl NotificationService for LogChannel {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn is_configured(&self) -> bool {
        self.enabled
    }

    fn send<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<bool>> {
        async move {
            self.log(alert);
            Ok(true)
        }
        .boxed()
    }
}
