//! Rule-based alert evaluation and notification engine.
//!
//! `alert-engine` polls metric values from a [`MetricSource`], evaluates them
//! against configured [`AlertRule`]s and turns triggered rules into alerts
//! that are tracked through their lifecycle and delivered to notification
//! channels.
//!
//! # Features
//!
//! - **Rule Types**: threshold, anomaly (z-score over recent history), trend
//!   (percent change over a window) and composite rules
//! - **Custom Evaluators**: attach a closure to a rule to replace the built-in strategy
//! - **Cooldowns**: suppress re-evaluation of a rule that triggered recently
//! - **Debouncing**: coalesce bursts of triggers into one alert
//! - **Grouping**: merge repeated triggers into the open alert for a rule
//! - **Auto-resolution**: resolve alerts automatically after a delay
//! - **Notification Fan-out**: deliver to several channels, tolerating partial failure
//!
//! # Example
//!
//! ```rust
//! use alert_engine::{
//!     AlertManager, AlertManagerConfig, AlertRule, AlertSeverity, InMemoryMetricSource,
//!     LogChannel, RuleType,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> alert_engine::Result<()> {
//! let source = InMemoryMetricSource::new();
//! let manager = AlertManager::new(AlertManagerConfig::default(), Arc::new(source.clone()))?;
//!
//! // Deliver alerts on the "log" channel
//! manager.add_channel(Arc::new(LogChannel::default()));
//!
//! // cpu_usage > 80
//! let rule = AlertRule::builder("HighCPU", RuleType::Threshold, "cpu_usage")
//!     .threshold(80.0)
//!     .severity(AlertSeverity::Critical)
//!     .channel("log")
//!     .build()?;
//! manager.add_rule(rule)?;
//!
//! source.set("cpu_usage", 85.0);
//! let summary = manager.check_all_rules().await;
//! assert_eq!(summary.triggered, 1);
//! assert_eq!(manager.active_alerts().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Scheduling
//!
//! [`AlertManager::start`] spawns an evaluation ticker and a cleanup ticker on
//! the current tokio runtime. [`AlertManager::stop`] cancels both together
//! with any pending debounce or auto-resolve timers.

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/alert-engine/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channels;
pub mod config;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod history;
pub mod manager;
pub mod source;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use channels::{LogChannel, NotificationService};
pub use config::AlertManagerConfig;
pub use debounce::Debouncer;
pub use dispatch::NotificationDispatcher;
pub use error::{AlertError, Result};
pub use evaluator::{CustomEvaluator, Evaluation, EvaluatorContext, RuleEvaluator};
pub use futures::future::BoxFuture;
pub use history::{MetricHistoryStore, MetricWindow};
pub use manager::{AlertManager, CheckOutcome, SendOptions, TickSummary};
pub use source::{InMemoryMetricSource, MetricSource};
pub use store::{AlertEvent, AlertStore, UpsertOutcome};
pub use types::{
    Alert, AlertContext, AlertRule, AlertRuleBuilder, AlertSeverity, AlertStatus,
    ComparisonOperator, Condition, MetricValue, RuleType,
};
