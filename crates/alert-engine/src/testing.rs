//! Test doubles shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::channels::NotificationService;
use crate::error::{AlertError, Result};
use crate::source::{InMemoryMetricSource, MetricSource};
use crate::types::{Alert, MetricValue};

/// How a [`FakeChannel`] responds to `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBehavior {
    Succeed,
    Fail,
    Decline,
    Hang,
}

/// A notification service that counts calls and answers as configured.
#[derive(Debug, Clone)]
pub struct FakeChannel {
    channel: String,
    behavior: ChannelBehavior,
    configured: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeChannel {
    pub fn new(channel: &str, behavior: ChannelBehavior) -> Self {
        Self {
            channel: channel.to_string(),
            behavior,
            configured: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NotificationService for FakeChannel {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn send<'a>(&'a self, _alert: &'a Alert) -> BoxFuture<'a, Result<bool>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior;
        let channel = self.channel.clone();
        async move {
            match behavior {
                ChannelBehavior::Succeed => Ok(true),
                ChannelBehavior::Decline => Ok(false),
                ChannelBehavior::Fail => Err(AlertError::NotificationFailed {
                    channel,
                    reason: "connection refused".to_string(),
                }),
                ChannelBehavior::Hang => {
                    futures::future::pending::<()>().await;
                    Ok(true)
                }
            }
        }
        .boxed()
    }
}

/// A metric source that never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HangingSource;

impl MetricSource for HangingSource {
    fn get_value<'a>(&'a self, _metric: &'a str) -> BoxFuture<'a, Result<MetricValue>> {
        futures::future::pending().boxed()
    }
}

/// A metric source that logs every fetch and answers after an optional delay.
#[derive(Debug, Clone, Default)]
pub struct RecordingSource {
    values: InMemoryMetricSource,
    delay: Duration,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set(&self, metric: &str, value: impl Into<MetricValue>) {
        self.values.set(metric, value);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

impl MetricSource for RecordingSource {
    fn get_value<'a>(&'a self, metric: &'a str) -> BoxFuture<'a, Result<MetricValue>> {
        self.fetched.lock().push(metric.to_string());
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.values.get_value(metric).await
        }
        .boxed()
    }
}
