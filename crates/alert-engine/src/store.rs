//! Alert lifecycle storage.
//!
//! [`AlertStore`] owns the set of open alerts and a bounded history of every
//! alert ever created. Both live behind a single lock so readers always see a
//! consistent pair. Lifecycle transitions are published as [`AlertEvent`]s
//! on a broadcast channel after the lock is released.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::types::{Alert, AlertContext};

/// Default number of alerts kept in history.
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// A lifecycle change of an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "alert", rename_all = "lowercase")]
pub enum AlertEvent {
    /// A new alert was raised.
    Created(Alert),
    /// A repeated trigger was merged into an open alert.
    Updated(Alert),
    /// An operator acknowledged the alert.
    Acknowledged(Alert),
    /// The alert was resolved.
    Resolved(Alert),
}

impl AlertEvent {
    /// Returns the alert carried by this event.
    #[must_use]
    pub const fn alert(&self) -> &Alert {
        match self {
            Self::Created(a) | Self::Updated(a) | Self::Acknowledged(a) | Self::Resolved(a) => a,
        }
    }

    /// Returns the event name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Acknowledged(_) => "acknowledged",
            Self::Resolved(_) => "resolved",
        }
    }
}

/// What [`AlertStore::upsert`] did with an alert.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// The alert was stored as a new open alert.
    Created(Alert),
    /// The trigger was merged into this existing alert.
    Updated(Alert),
}

impl UpsertOutcome {
    /// Returns the stored alert.
    #[must_use]
    pub const fn alert(&self) -> &Alert {
        match self {
            Self::Created(a) | Self::Updated(a) => a,
        }
    }

    /// Returns true if a new alert was created.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[derive(Debug, Default)]
struct Inner {
    active: HashMap<String, Alert>,
    history: VecDeque<Alert>,
}

impl Inner {
    fn push_history(&mut self, alert: Alert, limit: usize) {
        self.history.push_back(alert);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    /// Replaces the history copy of `alert`. Returns false if it was not found.
    fn sync_history(&mut self, alert: &Alert) -> bool {
        match self.history.iter_mut().rev().find(|a| a.id == alert.id) {
            Some(entry) => {
                entry.clone_from(alert);
                true
            }
            None => false,
        }
    }
}

/// Thread-safe store of open alerts and alert history.
#[derive(Debug, Clone)]
pub struct AlertStore {
    inner: Arc<RwLock<Inner>>,
    history_size: usize,
    events: broadcast::Sender<AlertEvent>,
}

impl AlertStore {
    /// Creates a store keeping `history_size` alerts and buffering
    /// `event_buffer` events per subscriber.
    #[must_use]
    pub fn new(history_size: usize, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            history_size: history_size.max(1),
            events,
        }
    }

    /// Subscribes to lifecycle events.
    ///
    /// Only events emitted after this call are received.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    /// Stores a newly triggered alert.
    ///
    /// With `group_similar` set, a trigger for a rule and source that already
    /// has an `Active` alert is merged into it instead.
    pub fn upsert(&self, alert: Alert, group_similar: bool) -> UpsertOutcome {
        let outcome = {
            let mut inner = self.inner.write();

            let similar_id = if group_similar {
                inner
                    .active
                    .values()
                    .find(|existing| existing.is_active() && existing.is_similar(&alert))
                    .map(|existing| existing.id.clone())
            } else {
                None
            };

            let merged = similar_id.and_then(|id| {
                let existing = inner.active.get_mut(&id)?;
                existing.merge_trigger(alert.clone());
                Some(existing.clone())
            });

            if let Some(merged) = merged {
                inner.sync_history(&merged);
                UpsertOutcome::Updated(merged)
            } else {
                inner.active.insert(alert.id.clone(), alert.clone());
                inner.push_history(alert.clone(), self.history_size);
                UpsertOutcome::Created(alert)
            }
        };

        match &outcome {
            UpsertOutcome::Created(alert) => {
                info!(
                    alert_id = %alert.id,
                    rule_id = %alert.rule.id,
                    severity = %alert.severity,
                    value = %alert.value,
                    "alert created"
                );
                self.emit(AlertEvent::Created(alert.clone()));
            }
            UpsertOutcome::Updated(alert) => {
                debug!(alert_id = %alert.id, value = %alert.value, "alert updated");
                self.emit(AlertEvent::Updated(alert.clone()));
            }
        }

        outcome
    }

    /// Acknowledges an active alert.
    ///
    /// Returns false if the alert is unknown or not in the `Active` status.
    pub fn acknowledge(&self, alert_id: &str, comment: Option<&str>) -> bool {
        let acknowledged = {
            let mut inner = self.inner.write();
            let Some(alert) = inner.active.get_mut(alert_id) else {
                return false;
            };
            if !alert.acknowledge(comment) {
                return false;
            }
            let snapshot = alert.clone();
            inner.sync_history(&snapshot);
            snapshot
        };

        info!(alert_id = %alert_id, "alert acknowledged");
        self.emit(AlertEvent::Acknowledged(acknowledged));
        true
    }

    /// Resolves an open alert and removes it from the open set.
    ///
    /// Returns false if no open alert has this id.
    pub fn resolve(&self, alert_id: &str, reason: Option<&str>) -> bool {
        let resolved = {
            let mut inner = self.inner.write();
            let Some(mut alert) = inner.active.remove(alert_id) else {
                return false;
            };
            alert.resolve(reason);
            if !inner.sync_history(&alert) {
                inner.push_history(alert.clone(), self.history_size);
            }
            alert
        };

        info!(alert_id = %alert_id, reason = reason.unwrap_or(""), "alert resolved");
        self.emit(AlertEvent::Resolved(resolved));
        true
    }

    /// Merges extra context into an alert, open or historical.
    ///
    /// Returns the updated alert, or `None` if the id is unknown.
    pub fn merge_context(&self, alert_id: &str, context: AlertContext) -> Option<Alert> {
        let mut inner = self.inner.write();

        if let Some(alert) = inner.active.get_mut(alert_id) {
            alert.context.extend(context);
            let snapshot = alert.clone();
            inner.sync_history(&snapshot);
            return Some(snapshot);
        }

        let entry = inner.history.iter_mut().rev().find(|a| a.id == alert_id)?;
        entry.context.extend(context);
        Some(entry.clone())
    }

    /// Records the channels that delivered an alert.
    ///
    /// Returns the updated alert, or `None` if the id is unknown.
    pub fn record_delivery(&self, alert_id: &str, channels: &[String]) -> Option<Alert> {
        let mut inner = self.inner.write();

        let update = |alert: &mut Alert| {
            for channel in channels {
                if !alert.sent_to.contains(channel) {
                    alert.sent_to.push(channel.clone());
                }
            }
            if !channels.is_empty() {
                alert.updated_at = Utc::now();
            }
        };

        if let Some(alert) = inner.active.get_mut(alert_id) {
            update(alert);
            let snapshot = alert.clone();
            inner.sync_history(&snapshot);
            return Some(snapshot);
        }

        let entry = inner.history.iter_mut().rev().find(|a| a.id == alert_id)?;
        update(entry);
        Some(entry.clone())
    }

    /// Returns the open alerts, oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.inner.read().active.values().cloned().collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        alerts
    }

    /// Returns the alert history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Alert> {
        self.inner.read().history.iter().cloned().collect()
    }

    /// Looks up an alert, open alerts first, then history.
    #[must_use]
    pub fn get(&self, alert_id: &str) -> Option<Alert> {
        let inner = self.inner.read();
        inner
            .active
            .get(alert_id)
            .or_else(|| inner.history.iter().rev().find(|a| a.id == alert_id))
            .cloned()
    }

    /// Returns the number of open alerts.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.read().active.len()
    }

    /// Drops resolved alerts older than `retention` from history.
    ///
    /// Returns the number of alerts dropped.
    pub fn cleanup(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now().checked_sub_signed(retention);

        let mut inner = self.inner.write();
        let before = inner.history.len();
        if let Some(cutoff) = cutoff {
            inner.history.retain(|alert| {
                !(alert.is_resolved() && alert.resolved_at.unwrap_or(alert.updated_at) < cutoff)
            });
        }
        let dropped = before - inner.history.len();

        if dropped > 0 {
            debug!(dropped, remaining = inner.history.len(), "alert history cleaned up");
        }
        dropped
    }

    /// Removes every alert.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.active.clear();
        inner.history.clear();
    }

    fn emit(&self, event: AlertEvent) {
        // Sending fails only when nobody is subscribed.
        let _ = self.events.send(event);
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE, 1024)
    }
}
