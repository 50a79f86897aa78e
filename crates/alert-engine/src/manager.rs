//! Alert manager for evaluating rules and managing alerts.
//!
//! The [`AlertManager`] ties the engine together: it owns the rule registry,
//! polls the [`MetricSource`] on a fixed interval, evaluates every enabled
//! rule, raises alerts through the debouncer into the [`AlertStore`] and
//! hands new alerts to the [`NotificationDispatcher`].

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channels::NotificationService;
use crate::config::AlertManagerConfig;
use crate::debounce::Debouncer;
use crate::dispatch::NotificationDispatcher;
use crate::error::{AlertError, Result};
use crate::evaluator::{Evaluation, RuleEvaluator};
use crate::history::MetricHistoryStore;
use crate::source::MetricSource;
use crate::store::{AlertEvent, AlertStore, UpsertOutcome};
use crate::types::{Alert, AlertContext, AlertRule, MetricValue};

/// Reason recorded on alerts resolved by the auto-resolve timer.
pub const AUTO_RESOLVE_REASON: &str = "auto-resolved";

/// The result of checking one rule.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// The rule triggered too recently and was not evaluated.
    Cooldown,
    /// The rule was evaluated and its condition does not hold.
    NotTriggered(Evaluation),
    /// The rule triggered and an alert was raised.
    Triggered(Evaluation),
}

impl CheckOutcome {
    /// Returns true if the rule triggered.
    #[must_use]
    pub const fn is_triggered(&self) -> bool {
        matches!(self, Self::Triggered(_))
    }
}

/// Counters from one evaluation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    /// Enabled rules checked during the tick.
    pub evaluated: usize,
    /// Rules skipped because of their cooldown.
    pub skipped: usize,
    /// Rules that triggered.
    pub triggered: usize,
    /// Rules whose fetch or evaluation failed.
    pub errors: usize,
}

/// Options for [`AlertManager::send_alert`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Channels to use instead of the rule's channels.
    pub channels: Option<Vec<String>>,
    /// Extra context merged into the alert before sending.
    pub context: AlertContext,
}

struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            task.abort();
        }
    }
}

struct Shared {
    config: AlertManagerConfig,
    source: Arc<dyn MetricSource>,
    rules: RwLock<HashMap<String, AlertRule>>,
    history: MetricHistoryStore,
    evaluator: RuleEvaluator,
    store: AlertStore,
    dispatcher: NotificationDispatcher,
    debouncer: Debouncer<Alert>,
    auto_resolver: Debouncer<String>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl Shared {
    fn on_alert_ready(self: &Arc<Self>, alert: Alert) {
        let outcome = self.store.upsert(alert, self.config.group_similar_alerts);
        if let UpsertOutcome::Created(alert) = outcome {
            self.schedule_auto_resolve(&alert.id);
            self.spawn_delivery(alert);
        }
    }

    fn schedule_auto_resolve(self: &Arc<Self>, alert_id: &str) {
        let Some(after) = self.config.auto_resolve_after() else {
            return;
        };

        let weak = Arc::downgrade(self);
        let scheduled = self.auto_resolver.submit(alert_id, alert_id.to_string(), after, move |id| {
            if let Some(shared) = weak.upgrade() {
                shared.store.resolve(&id, Some(AUTO_RESOLVE_REASON));
            }
        });

        if let Err(e) = scheduled {
            warn!(alert_id = %alert_id, error = %e, "failed to schedule auto-resolve");
        }
    }

    fn spawn_delivery(self: &Arc<Self>, alert: Alert) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(alert_id = %alert.id, "no runtime available, notification not sent");
            return;
        };

        let shared = Arc::clone(self);
        runtime.spawn(async move {
            let delivered = shared.dispatcher.deliver(&alert, &alert.rule.channels).await;
            if delivered.is_empty() {
                warn!(
                    manager = %shared.config.name,
                    alert_id = %alert.id,
                    channels = ?alert.rule.channels,
                    "alert was not delivered on any channel"
                );
            } else {
                shared.store.record_delivery(&alert.id, &delivered);
            }
        });
    }
}

/// The alert manager is responsible for evaluating rules and managing alerts.
///
/// Clones share the same state, so a clone can be handed to another task
/// to acknowledge or resolve alerts while the scheduler runs.
#[derive(Clone)]
pub struct AlertManager {
    shared: Arc<Shared>,
}

impl AlertManager {
    /// Creates a manager polling `source` for metric values.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: AlertManagerConfig, source: Arc<dyn MetricSource>) -> Result<Self> {
        config.validate()?;

        let shared = Shared {
            history: MetricHistoryStore::new(config.metric_history_size),
            evaluator: RuleEvaluator::new(config.enable_anomaly_detection),
            store: AlertStore::new(config.history_size, config.event_buffer_size),
            dispatcher: NotificationDispatcher::new(config.send_timeout()),
            debouncer: Debouncer::new(),
            auto_resolver: Debouncer::new(),
            rules: RwLock::new(HashMap::new()),
            scheduler: Mutex::new(None),
            source,
            config,
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AlertManagerConfig {
        &self.shared.config
    }

    /// Subscribes to alert lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.shared.store.subscribe()
    }

    // ============ Channels ============

    /// Registers a notification service under its channel id.
    ///
    /// A service already registered for that channel is replaced.
    pub fn add_channel(&self, service: Arc<dyn NotificationService>) {
        self.shared.dispatcher.register(service);
    }

    /// Removes the notification service for `channel`.
    pub fn remove_channel(&self, channel: &str) -> bool {
        self.shared.dispatcher.unregister(channel)
    }

    /// Returns the registered channel ids.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.shared.dispatcher.channels()
    }

    // ============ Rule Management ============

    /// Adds a new alert rule and returns its id.
    ///
    /// A rule without an id gets a generated one.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the rule is invalid or a rule with
    /// the same id already exists.
    pub fn add_rule(&self, mut rule: AlertRule) -> Result<String> {
        if rule.id.is_empty() {
            rule.id = Uuid::new_v4().to_string();
        }
        rule.dedup_channels();
        rule.validate()?;

        let mut rules = self.shared.rules.write();
        if rules.contains_key(&rule.id) {
            return Err(AlertError::InvalidRule {
                reason: format!("rule with ID '{}' already exists", rule.id),
            });
        }

        info!(rule_id = %rule.id, rule_name = %rule.name, rule_type = %rule.rule_type, "added alert rule");
        let id = rule.id.clone();
        rules.insert(id.clone(), rule);
        Ok(id)
    }

    /// Replaces an existing rule.
    ///
    /// A replacement without a trigger time keeps the stored rule's, so
    /// editing a rule does not reset its cooldown.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::RuleNotFound` if the rule doesn't exist, or
    /// `AlertError::InvalidRule` if the new rule is invalid.
    pub fn update_rule(&self, mut rule: AlertRule) -> Result<()> {
        rule.dedup_channels();
        rule.validate()?;

        let mut rules = self.shared.rules.write();
        let Some(stored) = rules.get(&rule.id) else {
            return Err(AlertError::RuleNotFound { id: rule.id });
        };
        if rule.last_triggered.is_none() {
            rule.last_triggered = stored.last_triggered;
        }

        info!(rule_id = %rule.id, rule_name = %rule.name, "updated alert rule");
        rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// Removes a rule by ID.
    ///
    /// Returns `true` if the rule was removed.
    pub fn remove_rule(&self, rule_id: &str) -> bool {
        let removed = self.shared.rules.write().remove(rule_id).is_some();
        if removed {
            info!(rule_id = %rule_id, "removed alert rule");
        }
        removed
    }

    /// Enables or disables a rule.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::RuleNotFound` if the rule doesn't exist, or
    /// `AlertError::InvalidRule` when enabling a rule without channels.
    pub fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<()> {
        let mut rules = self.shared.rules.write();
        let rule = rules.get_mut(rule_id).ok_or_else(|| AlertError::RuleNotFound {
            id: rule_id.to_string(),
        })?;

        if enabled && rule.channels.is_empty() {
            return Err(AlertError::InvalidRule {
                reason: format!("enabled rule '{}' has no notification channels", rule.name),
            });
        }

        rule.enabled = enabled;
        info!(rule_id = %rule_id, enabled, "rule toggled");
        Ok(())
    }

    /// Gets a rule by ID.
    #[must_use]
    pub fn get_rule(&self, rule_id: &str) -> Option<AlertRule> {
        self.shared.rules.read().get(rule_id).cloned()
    }

    /// Returns all rules, ordered by id.
    #[must_use]
    pub fn get_rules(&self) -> Vec<AlertRule> {
        let mut rules: Vec<AlertRule> = self.shared.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.shared.rules.read().len()
    }

    // ============ Evaluation ============

    /// Checks a single rule now.
    ///
    /// The rule's cooldown is honoured first, using the registered copy's
    /// trigger time when the rule is registered. A triggering rule raises an
    /// alert, delayed by the debounce timeout when one is configured.
    ///
    /// # Errors
    ///
    /// Returns the fetch or evaluation error of this rule.
    pub async fn check_rule(&self, rule: &AlertRule) -> Result<CheckOutcome> {
        let now = Utc::now();

        let registered_trigger = self
            .shared
            .rules
            .read()
            .get(&rule.id)
            .and_then(|r| r.last_triggered);
        let mut rule = rule.clone();
        rule.last_triggered = rule.last_triggered.max(registered_trigger);

        if rule.in_cooldown(now) {
            debug!(rule_id = %rule.id, "rule in cooldown, skipping");
            return Ok(CheckOutcome::Cooldown);
        }

        let value = self.fetch(&rule.metric).await?;
        let condition_values = if self.shared.evaluator.needs_condition_values(&rule, &value) {
            self.fetch_conditions(&rule).await
        } else {
            HashMap::new()
        };
        let history = self.shared.history.get(&rule.metric);

        let evaluation =
            self.shared
                .evaluator
                .evaluate(&rule, &value, history.as_ref(), &condition_values)?;

        if self.shared.config.enable_anomaly_detection {
            if let MetricValue::Number(sample) = value {
                self.shared.history.record(&rule.metric, sample, now);
            }
        }

        if !evaluation.triggered {
            return Ok(CheckOutcome::NotTriggered(evaluation));
        }

        rule.last_triggered = Some(Utc::now());
        let alert = Alert::from_rule(&rule, evaluation.value.clone(), evaluation.context.clone());
        if !self.claim_trigger(&rule, alert)? {
            debug!(rule_id = %rule.id, "rule triggered by a concurrent check, skipping");
            return Ok(CheckOutcome::Cooldown);
        }

        info!(
            manager = %self.shared.config.name,
            rule_id = %rule.id,
            metric = %rule.metric,
            value = %evaluation.value,
            "rule triggered"
        );

        Ok(CheckOutcome::Triggered(evaluation))
    }

    /// Checks every enabled rule once, concurrently.
    ///
    /// Per-rule failures are logged and counted, never propagated.
    pub async fn check_all_rules(&self) -> TickSummary {
        let rules: Vec<AlertRule> = self
            .shared
            .rules
            .read()
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect();

        let outcomes = join_all(rules.iter().map(|rule| self.check_rule(rule))).await;

        let mut summary = TickSummary {
            evaluated: rules.len(),
            ..TickSummary::default()
        };
        for (rule, outcome) in rules.iter().zip(outcomes) {
            match outcome {
                Ok(CheckOutcome::Cooldown) => summary.skipped += 1,
                Ok(CheckOutcome::Triggered(_)) => summary.triggered += 1,
                Ok(CheckOutcome::NotTriggered(_)) => {}
                Err(e) => {
                    summary.errors += 1;
                    warn!(rule_id = %rule.id, metric = %rule.metric, error = %e, "rule check failed");
                }
            }
        }

        debug!(
            manager = %self.shared.config.name,
            evaluated = summary.evaluated,
            triggered = summary.triggered,
            skipped = summary.skipped,
            errors = summary.errors,
            "evaluation tick complete"
        );
        summary
    }

    async fn fetch(&self, metric: &str) -> Result<MetricValue> {
        let timeout = self.shared.config.fetch_timeout();
        tokio::time::timeout(timeout, self.shared.source.get_value(metric))
            .await
            .map_err(|_| AlertError::Timeout {
                operation: format!("fetch of metric '{metric}'"),
                after_ms: self.shared.config.fetch_timeout_ms,
            })?
    }

    async fn fetch_conditions(&self, rule: &AlertRule) -> HashMap<String, MetricValue> {
        let mut metrics: Vec<&str> = Vec::new();
        for condition in &rule.conditions {
            if !metrics.contains(&condition.metric.as_str()) {
                metrics.push(&condition.metric);
            }
        }

        let fetched = join_all(metrics.iter().map(|m| self.fetch(m))).await;

        let mut values = HashMap::new();
        for (metric, result) in metrics.into_iter().zip(fetched) {
            match result {
                Ok(value) => {
                    values.insert(metric.to_string(), value);
                }
                Err(e) => {
                    warn!(rule_id = %rule.id, metric = %metric, error = %e, "condition metric unavailable");
                }
            }
        }
        values
    }

    /// Raises `alert` and stamps the registered rule with `rule.last_triggered`.
    ///
    /// Returns false without raising if the registered rule is already in
    /// cooldown. The rule lock is held until the alert is raised, so only one
    /// of several overlapping checks can claim a trigger. The stamp is only
    /// written once the alert has been handed to the debouncer.
    fn claim_trigger(&self, rule: &AlertRule, alert: Alert) -> Result<bool> {
        let triggered_at = rule.last_triggered.unwrap_or_else(Utc::now);

        let mut rules = self.shared.rules.write();
        let stored = rules.get_mut(&rule.id);
        if stored.as_ref().is_some_and(|stored| stored.in_cooldown(triggered_at)) {
            return Ok(false);
        }

        self.raise(rule, alert)?;
        if let Some(stored) = stored {
            stored.last_triggered = Some(triggered_at);
        }
        Ok(true)
    }

    fn raise(&self, rule: &AlertRule, alert: Alert) -> Result<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared.debouncer.submit(
            rule.debounce_key(),
            alert,
            self.shared.config.debounce_timeout(),
            move |alert| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_alert_ready(alert);
                }
            },
        )
    }

    // ============ Alert Management ============

    /// Sends an existing alert again.
    ///
    /// `options.context` is merged into the alert first. Channels default to
    /// the rule's channels. Returns true if at least one channel delivered.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::AlertNotFound` if the alert doesn't exist.
    pub async fn send_alert(&self, alert_id: &str, options: SendOptions) -> Result<bool> {
        let alert = self
            .shared
            .store
            .merge_context(alert_id, options.context)
            .ok_or_else(|| AlertError::AlertNotFound {
                id: alert_id.to_string(),
            })?;

        let channels = options.channels.unwrap_or_else(|| alert.rule.channels.clone());
        let delivered = self.shared.dispatcher.deliver(&alert, &channels).await;
        if delivered.is_empty() {
            return Ok(false);
        }

        self.shared.store.record_delivery(alert_id, &delivered);
        Ok(true)
    }

    /// Acknowledges an active alert. Returns false if it is unknown or not active.
    pub fn acknowledge(&self, alert_id: &str, comment: Option<&str>) -> bool {
        self.shared.store.acknowledge(alert_id, comment)
    }

    /// Resolves an open alert. Returns false if no open alert has this id.
    pub fn resolve(&self, alert_id: &str, reason: Option<&str>) -> bool {
        self.shared.auto_resolver.cancel(alert_id);
        self.shared.store.resolve(alert_id, reason)
    }

    /// Returns the open alerts, oldest first.
    #[must_use]
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.shared.store.active()
    }

    /// Returns the alert history, oldest first.
    #[must_use]
    pub fn alert_history(&self) -> Vec<Alert> {
        self.shared.store.history()
    }

    /// Gets an alert by ID, open or historical.
    #[must_use]
    pub fn get_alert(&self, alert_id: &str) -> Option<Alert> {
        self.shared.store.get(alert_id)
    }

    /// Drops resolved alerts older than the retention period.
    ///
    /// Returns the number of alerts dropped.
    pub fn cleanup(&self) -> usize {
        let dropped = self.shared.store.cleanup(self.shared.config.retention());
        if dropped > 0 {
            info!(manager = %self.shared.config.name, dropped, "removed old alerts");
        }
        dropped
    }

    /// Removes all alerts, metric history and pending timers. Rules are kept.
    pub fn reset(&self) {
        self.shared.debouncer.reset();
        self.shared.auto_resolver.reset();
        self.shared.store.reset();
        self.shared.history.clear();
        info!(manager = %self.shared.config.name, "all alert data cleared");
    }

    // ============ Scheduler ============

    /// Starts the evaluation and cleanup tickers.
    ///
    /// Calling this while running restarts both tickers.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Scheduler` when called outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| AlertError::Scheduler {
            reason: format!("no tokio runtime: {e}"),
        })?;

        let mut scheduler = self.shared.scheduler.lock();
        if let Some(previous) = scheduler.take() {
            previous.shutdown();
        }

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        if let Some(period) = self.shared.config.check_interval() {
            let weak = Arc::downgrade(&self.shared);
            let token = cancel.child_token();
            tasks.push(runtime.spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        _ = ticker.tick() => {
                            let Some(shared) = weak.upgrade() else { break };
                            let manager = AlertManager { shared };
                            tokio::select! {
                                () = token.cancelled() => break,
                                _ = manager.check_all_rules() => {}
                            }
                        }
                    }
                }
            }));
        }

        if let Some(period) = self.shared.config.cleanup_interval() {
            let weak = Arc::downgrade(&self.shared);
            let token = cancel.child_token();
            tasks.push(runtime.spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        _ = ticker.tick() => {
                            let Some(shared) = weak.upgrade() else { break };
                            AlertManager { shared }.cleanup();
                        }
                    }
                }
            }));
        }

        info!(
            manager = %self.shared.config.name,
            check_interval_ms = self.shared.config.check_interval_ms,
            cleanup_interval_ms = self.shared.config.cleanup_interval_ms,
            "alert scheduler started"
        );
        *scheduler = Some(SchedulerHandle { cancel, tasks });
        Ok(())
    }

    /// Stops the tickers and cancels pending debounce and auto-resolve timers.
    ///
    /// In-flight notification sends are not waited for.
    pub fn stop(&self) {
        let handle = self.shared.scheduler.lock().take();
        if let Some(handle) = handle {
            handle.shutdown();
            info!(manager = %self.shared.config.name, "alert scheduler stopped");
        }
        self.shared.debouncer.reset();
        self.shared.auto_resolver.reset();
    }

    /// Returns true while the tickers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.scheduler.lock().is_some()
    }
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager")
            .field("name", &self.shared.config.name)
            .field("rules", &self.rule_count())
            .field("active_alerts", &self.shared.store.active_count())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
