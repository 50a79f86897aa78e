//! Rule evaluation.
//!
//! [`RuleEvaluator`] turns a rule, the current metric value and the metric's
//! recent history into an [`Evaluation`]: a trigger decision plus diagnostic
//! context that ends up on the alert. The evaluator holds no state of its own.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{AlertError, Result};
use crate::history::MetricWindow;
use crate::types::{AlertContext, AlertRule, ComparisonOperator, MetricValue, RuleType};

/// Minimum number of samples before anomaly or trend rules can trigger.
pub const MIN_HISTORY_SAMPLES: usize = 5;

/// Number of recent samples a trend rule looks back over.
pub const TREND_WINDOW: usize = 10;

/// Z-score multiplier used when an anomaly rule has no numeric threshold.
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 3.0;

/// Percent change used when a trend rule has no numeric threshold.
pub const DEFAULT_TREND_THRESHOLD: f64 = 20.0;

/// Inputs visible to a custom evaluation function.
#[derive(Debug, Clone, Copy)]
pub struct EvaluatorContext<'a> {
    /// The rule being evaluated.
    pub rule: &'a AlertRule,
    /// Recorded samples of the rule's metric, if any.
    pub history: Option<&'a MetricWindow>,
    /// Current values of the metrics named by the rule's conditions.
    pub condition_values: &'a HashMap<String, MetricValue>,
}

type EvaluatorFn = dyn Fn(&MetricValue, &EvaluatorContext<'_>) -> Result<bool> + Send + Sync;

/// A user-supplied evaluation function that replaces a rule's built-in algorithm.
#[derive(Clone)]
pub struct CustomEvaluator(Arc<EvaluatorFn>);

impl CustomEvaluator {
    /// Wraps an evaluation function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&MetricValue, &EvaluatorContext<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    fn call(&self, value: &MetricValue, ctx: &EvaluatorContext<'_>) -> Result<bool> {
        (self.0)(value, ctx)
    }
}

impl fmt::Debug for CustomEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomEvaluator(..)")
    }
}

impl PartialEq for CustomEvaluator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The outcome of evaluating a rule once.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Whether the rule's condition holds.
    pub triggered: bool,
    /// The value that was evaluated.
    pub value: MetricValue,
    /// Diagnostic data computed during evaluation.
    pub context: AlertContext,
}

impl Evaluation {
    fn not_triggered(value: &MetricValue) -> Self {
        Self {
            triggered: false,
            value: value.clone(),
            context: AlertContext::new(),
        }
    }

    fn with_context(triggered: bool, value: &MetricValue, context: AlertContext) -> Self {
        Self {
            triggered,
            value: value.clone(),
            context,
        }
    }
}

/// How a rule is evaluated.
#[derive(Debug, Clone, Copy)]
enum Strategy<'a> {
    Custom(&'a CustomEvaluator),
    BuiltIn(RuleType),
}

impl<'a> Strategy<'a> {
    fn for_rule(rule: &'a AlertRule) -> Self {
        rule.evaluator
            .as_ref()
            .map_or(Self::BuiltIn(rule.rule_type), Self::Custom)
    }
}

/// Dispatches rules to their evaluation algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator {
    anomaly_detection: bool,
}

impl RuleEvaluator {
    /// Creates an evaluator. Anomaly rules never trigger unless `anomaly_detection` is set.
    #[must_use]
    pub const fn new(anomaly_detection: bool) -> Self {
        Self { anomaly_detection }
    }

    /// Returns true if evaluating `rule` against `value` needs the current
    /// values of the rule's conditions.
    ///
    /// Custom evaluators always get them. A composite rule only needs them
    /// once its primary condition holds; every other rule type ignores them.
    #[must_use]
    pub fn needs_condition_values(&self, rule: &AlertRule, value: &MetricValue) -> bool {
        if rule.conditions.is_empty() {
            return false;
        }

        match Strategy::for_rule(rule) {
            Strategy::Custom(_) => true,
            Strategy::BuiltIn(RuleType::Composite) => self.evaluate_threshold(rule, value).triggered,
            Strategy::BuiltIn(_) => false,
        }
    }

    /// Evaluates `rule` against `value`.
    ///
    /// `history` holds the samples recorded before this evaluation and
    /// `condition_values` the current values of the metrics named by a
    /// composite rule's conditions.
    ///
    /// # Errors
    ///
    /// Only a custom evaluator can fail; its error is returned unchanged.
    pub fn evaluate(
        &self,
        rule: &AlertRule,
        value: &MetricValue,
        history: Option<&MetricWindow>,
        condition_values: &HashMap<String, MetricValue>,
    ) -> Result<Evaluation> {
        match Strategy::for_rule(rule) {
            Strategy::Custom(custom) => {
                let ctx = EvaluatorContext {
                    rule,
                    history,
                    condition_values,
                };
                let triggered = custom.call(value, &ctx)?;
                Ok(Evaluation::with_context(triggered, value, AlertContext::new()))
            }
            Strategy::BuiltIn(RuleType::Threshold) => Ok(self.evaluate_threshold(rule, value)),
            Strategy::BuiltIn(RuleType::Anomaly) => Ok(self.evaluate_anomaly(rule, value, history)),
            Strategy::BuiltIn(RuleType::Trend) => Ok(Self::evaluate_trend(rule, value, history)),
            Strategy::BuiltIn(RuleType::Composite) => {
                Ok(self.evaluate_composite(rule, value, condition_values))
            }
        }
    }

    fn evaluate_threshold(&self, rule: &AlertRule, value: &MetricValue) -> Evaluation {
        let Some(threshold) = rule.threshold.as_ref() else {
            return Evaluation::not_triggered(value);
        };

        let triggered = check(rule, rule.operator, value, threshold);
        Evaluation::with_context(triggered, value, AlertContext::new())
    }

    fn evaluate_anomaly(
        &self,
        rule: &AlertRule,
        value: &MetricValue,
        history: Option<&MetricWindow>,
    ) -> Evaluation {
        if !self.anomaly_detection {
            return Evaluation::not_triggered(value);
        }

        let (Some(current), Some(window)) = (value.as_number(), history) else {
            return Evaluation::not_triggered(value);
        };

        if window.len() < MIN_HISTORY_SAMPLES {
            return Evaluation::not_triggered(value);
        }

        let average = window.mean();
        let std_dev = window.std_dev();
        let threshold = rule
            .threshold
            .as_ref()
            .and_then(MetricValue::as_number)
            .unwrap_or(DEFAULT_ANOMALY_THRESHOLD);

        let divisor = if std_dev == 0.0 { 1.0 } else { std_dev };
        let z_score = (current - average).abs() / divisor;

        let mut context = AlertContext::new();
        context.insert("average".to_string(), serde_json::json!(average));
        context.insert("stdDev".to_string(), serde_json::json!(std_dev));
        context.insert("zScore".to_string(), serde_json::json!(z_score));
        context.insert("threshold".to_string(), serde_json::json!(threshold));

        Evaluation::with_context(z_score > threshold, value, context)
    }

    fn evaluate_trend(
        rule: &AlertRule,
        value: &MetricValue,
        history: Option<&MetricWindow>,
    ) -> Evaluation {
        let (Some(newest), Some(window)) = (value.as_number(), history) else {
            return Evaluation::not_triggered(value);
        };

        if window.len() < MIN_HISTORY_SAMPLES {
            return Evaluation::not_triggered(value);
        }

        let lookback = window.len().min(TREND_WINDOW);
        let oldest = window.values[window.len() - lookback];
        if oldest == 0.0 {
            return Evaluation::not_triggered(value);
        }

        let percent_change = (newest - oldest) * 100.0 / oldest.abs();
        let threshold = rule
            .threshold
            .as_ref()
            .and_then(MetricValue::as_number)
            .unwrap_or(DEFAULT_TREND_THRESHOLD);

        let triggered = match rule.operator {
            ComparisonOperator::GreaterThan => percent_change > threshold,
            ComparisonOperator::LessThan => percent_change < -threshold,
            _ => percent_change.abs() > threshold,
        };

        let mut context = AlertContext::new();
        context.insert("percentChange".to_string(), serde_json::json!(percent_change));
        context.insert("oldestValue".to_string(), serde_json::json!(oldest));
        context.insert("newestValue".to_string(), serde_json::json!(newest));
        context.insert("changeThreshold".to_string(), serde_json::json!(threshold));

        Evaluation::with_context(triggered, value, context)
    }

    fn evaluate_composite(
        &self,
        rule: &AlertRule,
        value: &MetricValue,
        condition_values: &HashMap<String, MetricValue>,
    ) -> Evaluation {
        let primary = self.evaluate_threshold(rule, value);
        if !primary.triggered || rule.conditions.is_empty() {
            return primary;
        }

        for condition in &rule.conditions {
            let Some(current) = condition_values.get(&condition.metric) else {
                debug!(
                    rule_id = %rule.id,
                    metric = %condition.metric,
                    "no value for composite condition, not triggering"
                );
                return Evaluation::not_triggered(value);
            };

            if !check(rule, condition.operator, current, &condition.threshold) {
                return Evaluation::not_triggered(value);
            }
        }

        Evaluation::with_context(true, value, AlertContext::new())
    }
}

/// Compares a value against a threshold with the semantics of `operator`.
///
/// Numbers compare numerically, strings lexicographically and booleans only
/// for equality. Values of different types are never ordered and always
/// unequal. `contains`, `not_contains` and `regex` require two strings.
///
/// # Errors
///
/// Returns `AlertError::EvaluationError` if a `regex` threshold does not compile.
pub fn compare(
    operator: ComparisonOperator,
    value: &MetricValue,
    threshold: &MetricValue,
) -> Result<bool> {
    use ComparisonOperator as Op;

    let matched = match (value, threshold) {
        (MetricValue::Number(v), MetricValue::Number(t)) => operator.evaluate_numbers(*v, *t),
        (MetricValue::Text(v), MetricValue::Text(t)) => match operator {
            Op::GreaterThan => v > t,
            Op::GreaterThanOrEqual => v >= t,
            Op::LessThan => v < t,
            Op::LessThanOrEqual => v <= t,
            Op::Equal => v == t,
            Op::NotEqual => v != t,
            Op::Contains => v.contains(t.as_str()),
            Op::NotContains => !v.contains(t.as_str()),
            Op::Regex => Regex::new(t)
                .map_err(|e| AlertError::EvaluationError {
                    reason: format!("invalid regex '{t}': {e}"),
                })?
                .is_match(v),
        },
        (MetricValue::Bool(v), MetricValue::Bool(t)) => match operator {
            Op::Equal => v == t,
            Op::NotEqual => v != t,
            _ => false,
        },
        _ => operator == Op::NotEqual,
    };

    Ok(matched)
}

fn check(
    rule: &AlertRule,
    operator: ComparisonOperator,
    value: &MetricValue,
    threshold: &MetricValue,
) -> bool {
    compare(operator, value, threshold).unwrap_or_else(|e| {
        warn!(rule_id = %rule.id, error = %e, "comparison failed, not triggering");
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Condition;
    use chrono::Utc;

    fn rule(rule_type: RuleType, operator: ComparisonOperator, threshold: Option<MetricValue>) -> AlertRule {
        let mut builder = AlertRule::builder("test", rule_type, "cpu").operator(operator);
        if let Some(t) = threshold {
            builder = builder.threshold(t);
        }
        builder.build().unwrap()
    }

    fn window(values: &[f64]) -> MetricWindow {
        MetricWindow {
            values: values.to_vec(),
            timestamps: values.iter().map(|_| Utc::now()).collect(),
        }
    }

    fn no_conditions() -> HashMap<String, MetricValue> {
        HashMap::new()
    }

    mod compare_tests {
        use super::*;
        use test_case::test_case;

        #[test_case(ComparisonOperator::GreaterThan, 80.0, 80.0, false ; "strict greater at threshold")]
        #[test_case(ComparisonOperator::GreaterThan, 80.1, 80.0, true ; "greater above threshold")]
        #[test_case(ComparisonOperator::GreaterThanOrEqual, 80.0, 80.0, true ; "gte at threshold")]
        #[test_case(ComparisonOperator::LessThan, 10.0, 20.0, true ; "less below")]
        #[test_case(ComparisonOperator::Equal, 1.0, 1.0, true ; "numbers equal")]
        #[test_case(ComparisonOperator::NotEqual, 1.0, 2.0, true ; "numbers differ")]
        fn numbers(op: ComparisonOperator, value: f64, threshold: f64, expected: bool) {
            let result = compare(op, &value.into(), &threshold.into()).unwrap();
            assert_eq!(result, expected);
        }

        #[test_case(ComparisonOperator::Contains, "connection refused", "refused", true ; "contains match")]
        #[test_case(ComparisonOperator::Contains, "ok", "refused", false ; "contains miss")]
        #[test_case(ComparisonOperator::NotContains, "ok", "refused", true ; "not contains")]
        #[test_case(ComparisonOperator::Regex, "error 503", r"^error \d+$", true ; "regex match")]
        #[test_case(ComparisonOperator::Regex, "warning", r"^error", false ; "regex miss")]
        #[test_case(ComparisonOperator::Equal, "up", "up", true ; "strings equal")]
        #[test_case(ComparisonOperator::GreaterThan, "b", "a", true ; "lexicographic order")]
        fn strings(op: ComparisonOperator, value: &str, threshold: &str, expected: bool) {
            let result = compare(op, &value.into(), &threshold.into()).unwrap();
            assert_eq!(result, expected);
        }

        #[test]
        fn string_operators_ignore_numbers() {
            for op in [
                ComparisonOperator::Contains,
                ComparisonOperator::NotContains,
                ComparisonOperator::Regex,
            ] {
                assert!(!compare(op, &5.0.into(), &"5".into()).unwrap());
                assert!(!compare(op, &5.0.into(), &5.0.into()).unwrap());
            }
        }

        #[test]
        fn mixed_types_never_ordered() {
            assert!(!compare(ComparisonOperator::GreaterThan, &"9".into(), &1.0.into()).unwrap());
            assert!(!compare(ComparisonOperator::Equal, &"1".into(), &1.0.into()).unwrap());
            assert!(compare(ComparisonOperator::NotEqual, &"1".into(), &1.0.into()).unwrap());
        }

        #[test]
        fn booleans_compare_for_equality() {
            assert!(compare(ComparisonOperator::Equal, &true.into(), &true.into()).unwrap());
            assert!(compare(ComparisonOperator::NotEqual, &true.into(), &false.into()).unwrap());
            assert!(!compare(ComparisonOperator::GreaterThan, &true.into(), &false.into()).unwrap());
        }

        #[test]
        fn invalid_regex_is_an_error() {
            let err = compare(ComparisonOperator::Regex, &"x".into(), &"(".into()).unwrap_err();
            assert!(matches!(err, AlertError::EvaluationError { .. }));
        }
    }

    mod threshold_tests {
        use super::*;

        #[test]
        fn triggers_only_above_threshold() {
            let evaluator = RuleEvaluator::default();
            let rule = rule(RuleType::Threshold, ComparisonOperator::GreaterThan, Some(80.0.into()));

            let at = evaluator.evaluate(&rule, &80.0.into(), None, &no_conditions()).unwrap();
            let above = evaluator.evaluate(&rule, &80.5.into(), None, &no_conditions()).unwrap();

            assert!(!at.triggered);
            assert!(above.triggered);
            assert_eq!(above.value, MetricValue::Number(80.5));
        }

        #[test]
        fn invalid_regex_does_not_trigger() {
            let evaluator = RuleEvaluator::default();
            let rule = rule(RuleType::Threshold, ComparisonOperator::Regex, Some("[".into()));
            let result = evaluator.evaluate(&rule, &"anything".into(), None, &no_conditions()).unwrap();
            assert!(!result.triggered);
        }
    }

    mod anomaly_tests {
        use super::*;

        #[test]
        fn flat_history_z_score() {
            let evaluator = RuleEvaluator::new(true);
            let rule = rule(RuleType::Anomaly, ComparisonOperator::GreaterThan, Some(3.0.into()));
            let history = window(&[10.0; 5]);

            let result = evaluator.evaluate(&rule, &14.0.into(), Some(&history), &no_conditions()).unwrap();

            assert!(result.triggered);
            assert_eq!(result.context["zScore"], serde_json::json!(4.0));
            assert_eq!(result.context["average"], serde_json::json!(10.0));
            assert_eq!(result.context["stdDev"], serde_json::json!(0.0));
            assert_eq!(result.context["threshold"], serde_json::json!(3.0));
        }

        #[test]
        fn within_deviation_does_not_trigger() {
            let evaluator = RuleEvaluator::new(true);
            let rule = rule(RuleType::Anomaly, ComparisonOperator::GreaterThan, None);
            let history = window(&[8.0, 12.0, 8.0, 12.0, 8.0, 12.0]);

            let result = evaluator.evaluate(&rule, &13.0.into(), Some(&history), &no_conditions()).unwrap();

            assert!(!result.triggered);
            assert_eq!(result.context["threshold"], serde_json::json!(DEFAULT_ANOMALY_THRESHOLD));
        }

        #[test]
        fn fewer_than_five_samples_never_triggers() {
            let evaluator = RuleEvaluator::new(true);
            let rule = rule(RuleType::Anomaly, ComparisonOperator::GreaterThan, Some(1.0.into()));
            let history = window(&[10.0; 4]);

            let result = evaluator.evaluate(&rule, &1000.0.into(), Some(&history), &no_conditions()).unwrap();
            assert!(!result.triggered);
        }

        #[test]
        fn disabled_detection_never_triggers() {
            let evaluator = RuleEvaluator::new(false);
            let rule = rule(RuleType::Anomaly, ComparisonOperator::GreaterThan, Some(1.0.into()));
            let history = window(&[10.0; 10]);

            let result = evaluator.evaluate(&rule, &1000.0.into(), Some(&history), &no_conditions()).unwrap();
            assert!(!result.triggered);
        }

        #[test]
        fn non_numeric_value_does_not_trigger() {
            let evaluator = RuleEvaluator::new(true);
            let rule = rule(RuleType::Anomaly, ComparisonOperator::GreaterThan, None);
            let history = window(&[10.0; 10]);

            let result = evaluator.evaluate(&rule, &"high".into(), Some(&history), &no_conditions()).unwrap();
            assert!(!result.triggered);
        }
    }

    mod trend_tests {
        use super::*;
        use test_case::test_case;

        #[test_case(ComparisonOperator::GreaterThan, 130.0, true ; "rise above threshold")]
        #[test_case(ComparisonOperator::GreaterThan, 110.0, false ; "rise below threshold")]
        #[test_case(ComparisonOperator::LessThan, 70.0, true ; "fall below threshold")]
        #[test_case(ComparisonOperator::LessThan, 130.0, false ; "rise ignored for falling rule")]
        #[test_case(ComparisonOperator::Equal, 70.0, true ; "absolute change")]
        fn percent_change(op: ComparisonOperator, value: f64, expected: bool) {
            let evaluator = RuleEvaluator::default();
            let rule = rule(RuleType::Trend, op, Some(20.0.into()));
            let history = window(&[100.0; 5]);

            let result = evaluator.evaluate(&rule, &value.into(), Some(&history), &no_conditions()).unwrap();
            assert_eq!(result.triggered, expected);
        }

        #[test]
        fn baseline_is_oldest_of_last_ten() {
            let evaluator = RuleEvaluator::default();
            let rule = rule(RuleType::Trend, ComparisonOperator::GreaterThan, Some(20.0.into()));
            let mut values = vec![1.0; 5];
            values.extend([100.0; 10]);
            let history = window(&values);

            let result = evaluator.evaluate(&rule, &130.0.into(), Some(&history), &no_conditions()).unwrap();

            assert!(result.triggered);
            assert_eq!(result.context["oldestValue"], serde_json::json!(100.0));
            assert_eq!(result.context["newestValue"], serde_json::json!(130.0));
            assert_eq!(result.context["percentChange"], serde_json::json!(30.0));
            assert_eq!(result.context["changeThreshold"], serde_json::json!(20.0));
        }

        #[test]
        fn zero_baseline_never_triggers() {
            let evaluator = RuleEvaluator::default();
            let rule = rule(RuleType::Trend, ComparisonOperator::GreaterThan, None);
            let history = window(&[0.0, 1.0, 1.0, 1.0, 1.0]);

            let result = evaluator.evaluate(&rule, &50.0.into(), Some(&history), &no_conditions()).unwrap();
            assert!(!result.triggered);
        }

        #[test]
        fn short_history_never_triggers() {
            let evaluator = RuleEvaluator::default();
            let rule = rule(RuleType::Trend, ComparisonOperator::GreaterThan, None);
            let history = window(&[100.0; 4]);

            let result = evaluator.evaluate(&rule, &500.0.into(), Some(&history), &no_conditions()).unwrap();
            assert!(!result.triggered);
        }
    }

    mod composite_tests {
        use super::*;

        fn composite() -> AlertRule {
            AlertRule::builder("busy-and-slow", RuleType::Composite, "cpu")
                .threshold(80.0)
                .condition(Condition::new("latency", ComparisonOperator::GreaterThan, 500.0).unwrap())
                .condition(Condition::new("status", ComparisonOperator::NotEqual, "ok").unwrap())
                .build()
                .unwrap()
        }

        #[test]
        fn all_conditions_must_hold() {
            let evaluator = RuleEvaluator::default();
            let mut values = HashMap::new();
            values.insert("latency".to_string(), MetricValue::from(900.0));
            values.insert("status".to_string(), MetricValue::from("degraded"));

            let result = evaluator.evaluate(&composite(), &95.0.into(), None, &values).unwrap();
            assert!(result.triggered);

            values.insert("status".to_string(), MetricValue::from("ok"));
            let result = evaluator.evaluate(&composite(), &95.0.into(), None, &values).unwrap();
            assert!(!result.triggered);
        }

        #[test]
        fn primary_condition_short_circuits() {
            let evaluator = RuleEvaluator::default();
            let result = evaluator.evaluate(&composite(), &10.0.into(), None, &no_conditions()).unwrap();
            assert!(!result.triggered);
        }

        #[test]
        fn missing_condition_value_abstains() {
            let evaluator = RuleEvaluator::default();
            let mut values = HashMap::new();
            values.insert("latency".to_string(), MetricValue::from(900.0));

            let result = evaluator.evaluate(&composite(), &95.0.into(), None, &values).unwrap();
            assert!(!result.triggered);
        }

        #[test]
        fn condition_values_needed_only_after_primary_holds() {
            let evaluator = RuleEvaluator::default();
            let rule = composite();

            assert!(!evaluator.needs_condition_values(&rule, &10.0.into()));
            assert!(evaluator.needs_condition_values(&rule, &95.0.into()));
        }

        #[test]
        fn other_rule_types_never_need_condition_values() {
            let evaluator = RuleEvaluator::new(true);
            for rule_type in [RuleType::Threshold, RuleType::Anomaly, RuleType::Trend] {
                let rule = AlertRule::builder("with-conditions", rule_type, "cpu")
                    .threshold(80.0)
                    .condition(Condition::new("latency", ComparisonOperator::GreaterThan, 500.0).unwrap())
                    .build()
                    .unwrap();
                assert!(!evaluator.needs_condition_values(&rule, &95.0.into()));
            }

            let custom = AlertRule::builder("custom", RuleType::Threshold, "cpu")
                .condition(Condition::new("latency", ComparisonOperator::GreaterThan, 500.0).unwrap())
                .evaluator(CustomEvaluator::new(|_, ctx| Ok(ctx.condition_values.contains_key("latency"))))
                .build()
                .unwrap();
            assert!(evaluator.needs_condition_values(&custom, &1.0.into()));
        }

        #[test]
        fn without_conditions_acts_as_threshold() {
            let evaluator = RuleEvaluator::default();
            let rule = rule(RuleType::Composite, ComparisonOperator::GreaterThan, Some(80.0.into()));
            let result = evaluator.evaluate(&rule, &81.0.into(), None, &no_conditions()).unwrap();
            assert!(result.triggered);
        }
    }

    mod custom_tests {
        use super::*;

        #[test]
        fn custom_evaluator_takes_precedence() {
            let evaluator = RuleEvaluator::default();
            let rule = AlertRule::builder("odd", RuleType::Threshold, "cpu")
                .threshold(1000.0)
                .evaluator(CustomEvaluator::new(|value, ctx| {
                    assert_eq!(ctx.rule.name, "odd");
                    Ok(value.as_number().is_some_and(|n| n % 2.0 == 1.0))
                }))
                .build()
                .unwrap();

            assert!(evaluator.evaluate(&rule, &3.0.into(), None, &no_conditions()).unwrap().triggered);
            assert!(!evaluator.evaluate(&rule, &4.0.into(), None, &no_conditions()).unwrap().triggered);
        }

        #[test]
        fn custom_evaluator_error_propagates() {
            let evaluator = RuleEvaluator::default();
            let rule = AlertRule::builder("broken", RuleType::Threshold, "cpu")
                .evaluator(CustomEvaluator::new(|_, _| {
                    Err(AlertError::EvaluationError {
                        reason: "boom".to_string(),
                    })
                }))
                .build()
                .unwrap();

            let err = evaluator.evaluate(&rule, &1.0.into(), None, &no_conditions()).unwrap_err();
            assert!(matches!(err, AlertError::EvaluationError { reason } if reason == "boom"));
        }

        #[test]
        fn custom_evaluator_identity() {
            let a = CustomEvaluator::new(|_, _| Ok(true));
            let b = a.clone();
            let c = CustomEvaluator::new(|_, _| Ok(true));
            assert_eq!(a, b);
            assert_ne!(a, c);
            assert_eq!(format!("{a:?}"), "CustomEvaluator(..)");
        }
    }
}
