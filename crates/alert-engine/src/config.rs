//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Configuration for the [`AlertManager`](crate::AlertManager).
///
/// Every field is optional when deserializing; missing fields take the
/// values of [`AlertManagerConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertManagerConfig {
    /// Engine name, attached to log events.
    pub name: String,
    /// Maximum number of alerts kept in history.
    pub history_size: usize,
    /// Milliseconds between evaluation ticks. Zero disables the ticker.
    pub check_interval_ms: u64,
    /// Milliseconds between cleanup ticks. Zero disables the ticker.
    pub cleanup_interval_ms: u64,
    /// How long resolved alerts stay in history, in milliseconds.
    pub retention_ms: u64,
    /// Maximum number of samples kept per metric.
    pub metric_history_size: usize,
    /// Whether anomaly rules are evaluated and samples recorded.
    pub enable_anomaly_detection: bool,
    /// Whether repeated triggers merge into the open alert.
    pub group_similar_alerts: bool,
    /// Resolve alerts automatically this many milliseconds after creation.
    pub auto_resolve_after_ms: Option<u64>,
    /// Coalescing delay for repeated triggers. Zero raises alerts immediately.
    pub debounce_timeout_ms: u64,
    /// Upper bound on a single metric fetch, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Upper bound on a single channel send, in milliseconds.
    pub send_timeout_ms: u64,
    /// Events buffered per subscriber before it starts lagging.
    pub event_buffer_size: usize,
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        Self {
            name: "AlertManager".to_string(),
            history_size: 1000,
            check_interval_ms: 60_000,
            cleanup_interval_ms: DAY_MS,
            retention_ms: 30 * DAY_MS,
            metric_history_size: 100,
            enable_anomaly_detection: false,
            group_similar_alerts: false,
            auto_resolve_after_ms: None,
            debounce_timeout_ms: 0,
            fetch_timeout_ms: 5_000,
            send_timeout_ms: 10_000,
            event_buffer_size: 1024,
        }
    }
}

impl AlertManagerConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if the file cannot be read,
    /// parsed or fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AlertError::InvalidConfig {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;

        Self::from_json(&content)
    }

    /// Parses configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if the JSON is invalid or the
    /// configuration fails validation.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| AlertError::InvalidConfig {
            reason: format!("invalid JSON: {e}"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }

        if self.history_size == 0 {
            return Err(invalid("history_size must be positive"));
        }

        if self.metric_history_size == 0 {
            return Err(invalid("metric_history_size must be positive"));
        }

        if self.fetch_timeout_ms == 0 {
            return Err(invalid("fetch_timeout_ms must be positive"));
        }

        if self.send_timeout_ms == 0 {
            return Err(invalid("send_timeout_ms must be positive"));
        }

        if self.event_buffer_size == 0 {
            return Err(invalid("event_buffer_size must be positive"));
        }

        if self.auto_resolve_after_ms == Some(0) {
            return Err(invalid("auto_resolve_after_ms must be positive when set"));
        }

        Ok(())
    }

    /// Evaluation tick period, or `None` when disabled.
    #[must_use]
    pub fn check_interval(&self) -> Option<Duration> {
        non_zero(self.check_interval_ms)
    }

    /// Cleanup tick period, or `None` when disabled.
    #[must_use]
    pub fn cleanup_interval(&self) -> Option<Duration> {
        non_zero(self.cleanup_interval_ms)
    }

    /// How long resolved alerts are retained.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    /// Delay after which new alerts resolve themselves, if configured.
    #[must_use]
    pub fn auto_resolve_after(&self) -> Option<Duration> {
        self.auto_resolve_after_ms.and_then(non_zero)
    }

    /// Coalescing delay for repeated triggers.
    #[must_use]
    pub const fn debounce_timeout(&self) -> Duration {
        Duration::from_millis(self.debounce_timeout_ms)
    }

    /// Upper bound on a single metric fetch.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Upper bound on a single channel send.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

fn non_zero(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn invalid(reason: &str) -> AlertError {
    AlertError::InvalidConfig {
        reason: reason.to_string(),
    }
}
