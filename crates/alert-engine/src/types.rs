//! Core types for the alerting engine.
//!
//! This module provides the fundamental types used throughout the alert-engine crate:
//! - [`AlertSeverity`]: The severity level of an alert
//! - [`AlertStatus`]: The lifecycle status of an alert
//! - [`RuleType`]: The detection algorithm a rule uses
//! - [`ComparisonOperator`]: Operators for comparing metric values
//! - [`MetricValue`]: A numeric, textual or boolean metric reading
//! - [`Condition`]: An extra condition of a composite rule
//! - [`AlertRule`]: A rule that defines when and how to alert
//! - [`Alert`]: An active or resolved alert instance

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AlertError, Result};
use crate::evaluator::CustomEvaluator;

/// Free-form diagnostic data attached to an alert.
pub type AlertContext = HashMap<String, serde_json::Value>;

/// Channel used when a rule does not name any.
pub const DEFAULT_CHANNEL: &str = "email";

/// The severity level of an alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational alert, no action required.
    Info,
    /// Warning alert, should be investigated.
    #[default]
    Warning,
    /// Error alert, something is failing.
    Error,
    /// Critical alert, requires immediate attention.
    Critical,
}

impl AlertSeverity {
    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Returns the priority of this severity (higher = more urgent).
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Warning => 2,
            Self::Error => 3,
            Self::Critical => 4,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The lifecycle status of an alert.
///
/// Status only moves forward: `Active -> Acknowledged -> Resolved`
/// or directly `Active -> Resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// The alert has fired and nobody has looked at it yet.
    Active,
    /// An operator has seen the alert.
    Acknowledged,
    /// The alert is closed.
    Resolved,
}

impl AlertStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    /// Returns true if the alert has not been resolved yet.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Acknowledged)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The detection algorithm used by a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// Direct comparison against a fixed threshold.
    #[default]
    Threshold,
    /// Z-score deviation from the metric's recent history.
    Anomaly,
    /// Percent change relative to an older sample.
    Trend,
    /// Primary threshold ANDed with extra conditions on other metrics.
    Composite,
}

impl RuleType {
    /// Returns the rule type as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::Anomaly => "anomaly",
            Self::Trend => "trend",
            Self::Composite => "composite",
        }
    }

    /// Returns true if this rule type reads the metric history.
    #[must_use]
    pub const fn uses_history(&self) -> bool {
        matches!(self, Self::Anomaly | Self::Trend)
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Comparison operators for rule conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    /// Greater than (>).
    #[default]
    #[serde(rename = ">")]
    GreaterThan,
    /// Greater than or equal (>=).
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    /// Less than (<).
    #[serde(rename = "<")]
    LessThan,
    /// Less than or equal (<=).
    #[serde(rename = "<=")]
    LessThanOrEqual,
    /// Equal (==).
    #[serde(rename = "==")]
    Equal,
    /// Not equal (!=).
    #[serde(rename = "!=")]
    NotEqual,
    /// Substring match (strings only).
    #[serde(rename = "contains")]
    Contains,
    /// Negated substring match (strings only).
    #[serde(rename = "not_contains")]
    NotContains,
    /// Regular expression match (strings only).
    #[serde(rename = "regex")]
    Regex,
}

impl ComparisonOperator {
    /// Evaluates the comparison between two numbers.
    ///
    /// String-only operators never match numbers.
    #[must_use]
    pub fn evaluate_numbers(&self, left: f64, right: f64) -> bool {
        match self {
            Self::GreaterThan => left > right,
            Self::GreaterThanOrEqual => left >= right,
            Self::LessThan => left < right,
            Self::LessThanOrEqual => left <= right,
            Self::Equal => (left - right).abs() < f64::EPSILON,
            Self::NotEqual => (left - right).abs() >= f64::EPSILON,
            Self::Contains | Self::NotContains | Self::Regex => false,
        }
    }

    /// Returns true for operators that only apply to strings.
    #[must_use]
    pub const fn is_string_operator(&self) -> bool {
        matches!(self, Self::Contains | Self::NotContains | Self::Regex)
    }

    /// Returns the operator as a string symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::Regex => "regex",
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_symbol())
    }
}

/// A metric reading or a comparand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// A boolean flag.
    Bool(bool),
    /// A numeric sample.
    Number(f64),
    /// A textual value such as a status string.
    Text(String),
}

impl MetricValue {
    /// Returns the value as a number, if it is one.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a string slice, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// An extra condition checked by composite rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// The name of the metric to evaluate.
    pub metric: String,
    /// The comparison operator.
    pub operator: ComparisonOperator,
    /// The value to compare against.
    pub threshold: MetricValue,
}

impl Condition {
    /// Creates a new condition.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the metric name is empty.
    pub fn new(
        metric: impl Into<String>,
        operator: ComparisonOperator,
        threshold: impl Into<MetricValue>,
    ) -> Result<Self> {
        let metric = metric.into();
        if metric.is_empty() {
            return Err(AlertError::InvalidRule {
                reason: "condition metric name cannot be empty".to_string(),
            });
        }

        Ok(Self {
            metric,
            operator,
            threshold: threshold.into(),
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.metric, self.operator, self.threshold)
    }
}

fn default_channels() -> Vec<String> {
    vec![DEFAULT_CHANNEL.to_string()]
}

const fn default_enabled() -> bool {
    true
}

/// A rule that defines when and how to trigger an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique identifier for the rule. Assigned on registration when empty.
    #[serde(default)]
    pub id: String,
    /// Human-readable name for the rule.
    pub name: String,
    /// Longer description copied onto alerts.
    #[serde(default)]
    pub description: String,
    /// The detection algorithm.
    #[serde(rename = "type", default)]
    pub rule_type: RuleType,
    /// The metric this rule observes.
    pub metric: String,
    /// The comparison operator.
    #[serde(default)]
    pub operator: ComparisonOperator,
    /// The comparand; multiplier for anomaly rules, percent for trend rules.
    #[serde(default)]
    pub threshold: Option<MetricValue>,
    /// The severity of alerts generated by this rule.
    #[serde(default)]
    pub severity: AlertSeverity,
    /// Notification channel ids, in delivery order.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    /// Minimum time between two triggers, in milliseconds.
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
    /// Extra conditions ANDed with the primary one (composite rules).
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Whether this rule is evaluated by the scheduler.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// When this rule last triggered.
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    /// Evaluation function overriding the built-in algorithm.
    #[serde(skip)]
    pub evaluator: Option<CustomEvaluator>,
}

impl AlertRule {
    /// Maximum allowed length for rule names.
    pub const MAX_NAME_LENGTH: usize = 256;

    /// Creates a new alert rule builder.
    pub fn builder(
        name: impl Into<String>,
        rule_type: RuleType,
        metric: impl Into<String>,
    ) -> AlertRuleBuilder {
        AlertRuleBuilder::new(name, rule_type, metric)
    }

    /// Returns the cooldown as a [`Duration`].
    #[must_use]
    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown_ms.map(Duration::from_millis)
    }

    /// Returns true if the rule triggered less than `cooldown` before `now`.
    #[must_use]
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match (self.last_triggered, self.cooldown_ms) {
            (Some(last), Some(cooldown)) if cooldown > 0 => {
                let elapsed = now.signed_duration_since(last).num_milliseconds();
                elapsed < i64::try_from(cooldown).unwrap_or(i64::MAX)
            }
            _ => false,
        }
    }

    /// Key under which repeated triggers of this rule are coalesced.
    #[must_use]
    pub fn debounce_key(&self) -> String {
        format!("{}-{}", self.id, self.metric)
    }

    /// Removes duplicate channels while keeping their first position.
    pub fn dedup_channels(&mut self) {
        let mut seen = Vec::with_capacity(self.channels.len());
        self.channels.retain(|c| {
            if seen.contains(c) {
                false
            } else {
                seen.push(c.clone());
                true
            }
        });
    }

    /// Checks that the rule can be registered.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(invalid("rule name cannot be empty"));
        }

        if self.name.len() > Self::MAX_NAME_LENGTH {
            return Err(invalid(format!(
                "rule name exceeds maximum length of {} characters",
                Self::MAX_NAME_LENGTH
            )));
        }

        if self.metric.is_empty() {
            return Err(invalid("metric name cannot be empty"));
        }

        if self.enabled && self.channels.is_empty() {
            return Err(invalid(format!(
                "enabled rule '{}' has no notification channels",
                self.name
            )));
        }

        let needs_threshold = matches!(self.rule_type, RuleType::Threshold | RuleType::Composite);
        if needs_threshold && self.threshold.is_none() && self.evaluator.is_none() {
            return Err(invalid(format!(
                "{} rule '{}' requires a threshold",
                self.rule_type, self.name
            )));
        }

        if let Some(cond) = self.conditions.iter().find(|c| c.metric.is_empty()) {
            return Err(invalid(format!(
                "condition '{cond}' has an empty metric name"
            )));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> AlertError {
    AlertError::InvalidRule {
        reason: reason.into(),
    }
}

/// Builder for creating [`AlertRule`] instances.
#[derive(Debug)]
pub struct AlertRuleBuilder {
    id: Option<String>,
    name: String,
    description: String,
    rule_type: RuleType,
    metric: String,
    operator: ComparisonOperator,
    threshold: Option<MetricValue>,
    severity: AlertSeverity,
    channels: Vec<String>,
    cooldown_ms: Option<u64>,
    conditions: Vec<Condition>,
    enabled: bool,
    evaluator: Option<CustomEvaluator>,
}

impl AlertRuleBuilder {
    fn new(name: impl Into<String>, rule_type: RuleType, metric: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            rule_type,
            metric: metric.into(),
            operator: ComparisonOperator::GreaterThan,
            threshold: None,
            severity: AlertSeverity::Warning,
            channels: Vec::new(),
            cooldown_ms: None,
            conditions: Vec::new(),
            enabled: true,
            evaluator: None,
        }
    }

    /// Uses a fixed rule ID instead of a generated one.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the comparison operator.
    #[must_use]
    pub const fn operator(mut self, operator: ComparisonOperator) -> Self {
        self.operator = operator;
        self
    }

    /// Sets the threshold.
    #[must_use]
    pub fn threshold(mut self, threshold: impl Into<MetricValue>) -> Self {
        self.threshold = Some(threshold.into());
        self
    }

    /// Sets the severity level.
    #[must_use]
    pub const fn severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Adds a notification channel. Duplicates are ignored.
    #[must_use]
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        if !self.channels.contains(&channel) {
            self.channels.push(channel);
        }
        self
    }

    /// Sets the minimum time between two triggers.
    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = Some(u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Adds a composite condition.
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets whether the rule is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replaces the built-in algorithm with a custom evaluation function.
    #[must_use]
    pub fn evaluator(mut self, evaluator: CustomEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Builds the [`AlertRule`].
    ///
    /// Rules built without an explicit channel use [`DEFAULT_CHANNEL`].
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the rule fails validation.
    pub fn build(self) -> Result<AlertRule> {
        let channels = if self.channels.is_empty() {
            default_channels()
        } else {
            self.channels
        };

        let rule = AlertRule {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name,
            description: self.description,
            rule_type: self.rule_type,
            metric: self.metric,
            operator: self.operator,
            threshold: self.threshold,
            severity: self.severity,
            channels,
            cooldown_ms: self.cooldown_ms,
            conditions: self.conditions,
            enabled: self.enabled,
            last_triggered: None,
            evaluator: self.evaluator,
        };

        rule.validate()?;
        Ok(rule)
    }
}

/// An active or resolved alert instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier for this alert instance.
    pub id: String,
    /// The name of the rule that generated this alert.
    pub name: String,
    /// The rule description.
    pub description: String,
    /// The metric that triggered the alert.
    pub source: String,
    /// The severity of the alert.
    pub severity: AlertSeverity,
    /// The metric value that triggered the alert.
    pub value: MetricValue,
    /// Diagnostic data from the evaluation and lifecycle actions.
    pub context: AlertContext,
    /// The lifecycle status.
    pub status: AlertStatus,
    /// When the alert was created.
    pub created_at: DateTime<Utc>,
    /// When the alert last changed.
    pub updated_at: DateTime<Utc>,
    /// When the alert was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Snapshot of the rule at trigger time.
    pub rule: AlertRule,
    /// Channels that delivered this alert.
    pub sent_to: Vec<String>,
}

impl Alert {
    /// Creates a new active alert from a triggered rule.
    #[must_use]
    pub fn from_rule(rule: &AlertRule, value: MetricValue, context: AlertContext) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: rule.name.clone(),
            description: rule.description.clone(),
            source: rule.metric.clone(),
            severity: rule.severity,
            value,
            context,
            status: AlertStatus::Active,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            rule: rule.clone(),
            sent_to: Vec::new(),
        }
    }

    /// Returns true if the alert is in the `Active` status.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Returns true if the alert has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == AlertStatus::Resolved
    }

    /// Returns true if `other` comes from the same rule and source.
    #[must_use]
    pub fn is_similar(&self, other: &Self) -> bool {
        self.rule.id == other.rule.id && self.source == other.source
    }

    /// Moves an active alert to `Acknowledged`.
    ///
    /// Returns false if the alert was not active.
    pub fn acknowledge(&mut self, comment: Option<&str>) -> bool {
        if self.status != AlertStatus::Active {
            return false;
        }

        self.status = AlertStatus::Acknowledged;
        self.updated_at = Utc::now();
        if let Some(comment) = comment {
            self.context.insert(
                "acknowledgementComment".to_string(),
                serde_json::Value::String(comment.to_string()),
            );
        }
        true
    }

    /// Moves the alert to `Resolved`.
    ///
    /// Returns false if the alert was already resolved.
    pub fn resolve(&mut self, reason: Option<&str>) -> bool {
        if self.status == AlertStatus::Resolved {
            return false;
        }

        let now = Utc::now();
        self.status = AlertStatus::Resolved;
        self.updated_at = now;
        self.resolved_at = Some(now);
        if let Some(reason) = reason {
            self.context.insert(
                "resolutionReason".to_string(),
                serde_json::Value::String(reason.to_string()),
            );
        }
        true
    }

    /// Folds a newer trigger of the same rule into this alert.
    pub fn merge_trigger(&mut self, newer: Self) {
        self.value = newer.value;
        self.context.extend(newer.context);
        self.updated_at = Utc::now();
    }
}
