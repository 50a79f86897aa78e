//! Error types for the alert-engine crate.

use thiserror::Error;

/// Errors that can occur in the alerting engine.
#[derive(Debug, Error)]
pub enum AlertError {
    /// Invalid alert rule configuration.
    #[error("invalid alert rule: {reason}")]
    InvalidRule {
        /// The reason the rule is invalid.
        reason: String,
    },

    /// Alert rule with the given ID was not found.
    #[error("rule not found: {id}")]
    RuleNotFound {
        /// The rule ID that was not found.
        id: String,
    },

    /// Alert with the given ID was not found.
    #[error("alert not found: {id}")]
    AlertNotFound {
        /// The alert ID that was not found.
        id: String,
    },

    /// Notification delivery failed on a channel.
    #[error("notification via '{channel}' failed: {reason}")]
    NotificationFailed {
        /// The channel that failed.
        channel: String,
        /// The reason the notification failed.
        reason: String,
    },

    /// Failed to evaluate a rule.
    #[error("rule evaluation failed: {reason}")]
    EvaluationError {
        /// The reason the evaluation failed.
        reason: String,
    },

    /// The metric source could not provide a value.
    #[error("failed to fetch metric '{metric}': {reason}")]
    MetricFetch {
        /// The metric that was requested.
        metric: String,
        /// The reason the fetch failed.
        reason: String,
    },

    /// An external call did not complete in time.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout that elapsed, in milliseconds.
        after_ms: u64,
    },

    /// Invalid engine configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// The scheduler could not be started.
    #[error("scheduler error: {reason}")]
    Scheduler {
        /// The reason the scheduler failed.
        reason: String,
    },
}

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;
