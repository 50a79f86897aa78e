//! Notification fan-out.
//!
//! The [`NotificationDispatcher`] maps channel ids to registered
//! [`NotificationService`]s and delivers one alert to several channels
//! concurrently. A failing or slow channel never prevents the others from
//! delivering.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::channels::NotificationService;
use crate::error::AlertError;
use crate::types::Alert;

/// Default per-channel send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes alerts to notification services by channel id.
#[derive(Clone)]
pub struct NotificationDispatcher {
    services: Arc<RwLock<HashMap<String, Arc<dyn NotificationService>>>>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    /// Creates a dispatcher that gives each channel `send_timeout` to deliver.
    #[must_use]
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
            send_timeout,
        }
    }

    /// Registers a service under its channel id.
    ///
    /// Returns the service previously registered for that channel, if any.
    pub fn register(
        &self,
        service: Arc<dyn NotificationService>,
    ) -> Option<Arc<dyn NotificationService>> {
        let channel = service.channel().to_string();
        debug!(channel = %channel, "notification service registered");
        self.services.write().insert(channel, service)
    }

    /// Removes the service for `channel`. Returns true if one was registered.
    pub fn unregister(&self, channel: &str) -> bool {
        self.services.write().remove(channel).is_some()
    }

    /// Returns true if a service handles `channel`.
    #[must_use]
    pub fn is_registered(&self, channel: &str) -> bool {
        self.services.read().contains_key(channel)
    }

    /// Returns the registered channel ids, sorted.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.services.read().keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Delivers `alert` on each of `channels` concurrently.
    ///
    /// Unregistered and unconfigured channels are skipped. Returns the
    /// channels that delivered, in request order.
    pub async fn deliver(&self, alert: &Alert, channels: &[String]) -> Vec<String> {
        let mut targets: Vec<(String, Arc<dyn NotificationService>)> = Vec::new();
        {
            let services = self.services.read();
            for channel in channels {
                if targets.iter().any(|(c, _)| c == channel) {
                    continue;
                }
                match services.get(channel) {
                    Some(service) if service.is_configured() => {
                        targets.push((channel.clone(), Arc::clone(service)));
                    }
                    Some(_) => {
                        warn!(alert_id = %alert.id, channel = %channel, "notification service not configured, skipping");
                    }
                    None => {
                        warn!(alert_id = %alert.id, channel = %channel, "no notification service registered, skipping");
                    }
                }
            }
        }

        let timeout_ms = u64::try_from(self.send_timeout.as_millis()).unwrap_or(u64::MAX);
        let sends = targets.iter().map(|(channel, service)| async move {
            let outcome = tokio::time::timeout(self.send_timeout, service.send(alert)).await;
            match outcome {
                Ok(Ok(true)) => {
                    debug!(alert_id = %alert.id, channel = %channel, "notification sent");
                    true
                }
                Ok(Ok(false)) => {
                    warn!(alert_id = %alert.id, channel = %channel, "notification declined by channel");
                    false
                }
                Ok(Err(e)) => {
                    warn!(alert_id = %alert.id, channel = %channel, error = %e, "notification failed");
                    false
                }
                Err(_) => {
                    let e = AlertError::Timeout {
                        operation: format!("notification via '{channel}'"),
                        after_ms: timeout_ms,
                    };
                    warn!(alert_id = %alert.id, channel = %channel, error = %e, "notification failed");
                    false
                }
            }
        });

        let results = join_all(sends).await;

        targets
            .into_iter()
            .zip(results)
            .filter_map(|((channel, _), ok)| ok.then_some(channel))
            .collect()
    }

    /// Delivers `alert` and appends the succeeding channels to `alert.sent_to`.
    ///
    /// Returns true if at least one channel delivered.
    pub async fn send(&self, alert: &mut Alert, channels: &[String]) -> bool {
        let delivered = self.deliver(alert, channels).await;
        for channel in &delivered {
            if !alert.sent_to.contains(channel) {
                alert.sent_to.push(channel.clone());
            }
        }
        !delivered.is_empty()
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("channels", &self.channels())
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::LogChannel;
    use crate::testing::{ChannelBehavior, FakeChannel};
    use crate::types::{AlertContext, AlertRule, RuleType};

    fn test_alert() -> Alert {
        let rule = AlertRule::builder("HighCPU", RuleType::Threshold, "cpu_usage")
            .threshold(80.0)
            .build()
            .unwrap();
        Alert::from_rule(&rule, 85.0.into(), AlertContext::new())
    }

    fn channels(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn register_and_unregister() {
        let dispatcher = NotificationDispatcher::default();
        assert!(dispatcher.register(Arc::new(LogChannel::new("email"))).is_none());
        assert!(dispatcher.register(Arc::new(LogChannel::new("email"))).is_some());
        assert!(dispatcher.is_registered("email"));
        assert_eq!(dispatcher.channels(), vec!["email".to_string()]);

        assert!(dispatcher.unregister("email"));
        assert!(!dispatcher.unregister("email"));
    }

    #[tokio::test]
    async fn partial_failure_records_successes() {
        let dispatcher = NotificationDispatcher::default();
        let email = FakeChannel::new("email", ChannelBehavior::Succeed);
        let slack = FakeChannel::new("slack", ChannelBehavior::Fail);
        dispatcher.register(Arc::new(email.clone()));
        dispatcher.register(Arc::new(slack.clone()));

        let mut alert = test_alert();
        let ok = dispatcher.send(&mut alert, &channels(&["email", "slack"])).await;

        assert!(ok);
        assert_eq!(alert.sent_to, vec!["email".to_string()]);
        assert_eq!(email.calls(), 1);
        assert_eq!(slack.calls(), 1);
    }

    #[tokio::test]
    async fn all_failing_returns_false() {
        let dispatcher = NotificationDispatcher::default();
        dispatcher.register(Arc::new(FakeChannel::new("email", ChannelBehavior::Fail)));
        dispatcher.register(Arc::new(FakeChannel::new("sms", ChannelBehavior::Decline)));

        let mut alert = test_alert();
        assert!(!dispatcher.send(&mut alert, &channels(&["email", "sms"])).await);
        assert!(alert.sent_to.is_empty());
    }

    #[tokio::test]
    async fn unregistered_and_unconfigured_are_skipped() {
        let dispatcher = NotificationDispatcher::default();
        let disabled = FakeChannel::new("pager", ChannelBehavior::Succeed).unconfigured();
        dispatcher.register(Arc::new(disabled.clone()));
        dispatcher.register(Arc::new(FakeChannel::new("email", ChannelBehavior::Succeed)));

        let delivered = dispatcher
            .deliver(&test_alert(), &channels(&["webhook", "pager", "email"]))
            .await;

        assert_eq!(delivered, vec!["email".to_string()]);
        assert_eq!(disabled.calls(), 0);
    }

    #[tokio::test]
    async fn results_follow_request_order() {
        let dispatcher = NotificationDispatcher::default();
        for id in ["a", "b", "c"] {
            dispatcher.register(Arc::new(FakeChannel::new(id, ChannelBehavior::Succeed)));
        }

        let delivered = dispatcher
            .deliver(&test_alert(), &channels(&["c", "a", "b", "a"]))
            .await;
        assert_eq!(delivered, channels(&["c", "a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_channel_times_out() {
        let dispatcher = NotificationDispatcher::new(Duration::from_millis(100));
        dispatcher.register(Arc::new(FakeChannel::new("slow", ChannelBehavior::Hang)));
        dispatcher.register(Arc::new(FakeChannel::new("fast", ChannelBehavior::Succeed)));

        let delivered = dispatcher
            .deliver(&test_alert(), &channels(&["slow", "fast"]))
            .await;
        assert_eq!(delivered, vec!["fast".to_string()]);
    }
}
