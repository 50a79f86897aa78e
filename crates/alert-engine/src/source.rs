//! Metric value providers.
//!
//! The scheduler polls a [`MetricSource`] for the current value of each
//! rule's metric. [`InMemoryMetricSource`] is a simple implementation backed
//! by a map, useful for tests and for embedding the engine behind another
//! collector that pushes values in.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::error::{AlertError, Result};
use crate::types::MetricValue;

/// Provides current metric values.
pub trait MetricSource: Send + Sync {
    /// Fetches the current value of `metric`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::MetricFetch` if the value is unavailable.
    fn get_value<'a>(&'a self, metric: &'a str) -> BoxFuture<'a, Result<MetricValue>>;
}

/// A metric source backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetricSource {
    values: Arc<RwLock<HashMap<String, MetricValue>>>,
}

impl InMemoryMetricSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current value of a metric.
    pub fn set(&self, metric: impl Into<String>, value: impl Into<MetricValue>) {
        self.values.write().insert(metric.into(), value.into());
    }

    /// Removes a metric. Subsequent fetches fail.
    pub fn remove(&self, metric: &str) -> Option<MetricValue> {
        self.values.write().remove(metric)
    }

    /// Returns the current value of a metric without going through the trait.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<MetricValue> {
        self.values.read().get(metric).cloned()
    }
}

impl MetricSource for InMemoryMetricSource {
    fn get_value<'a>(&'a self, metric: &'a str) -> BoxFuture<'a, Result<MetricValue>> {
        let value = self.get(metric);
        async move {
            value.ok_or_else(|| AlertError::MetricFetch {
                metric: metric.to_string(),
                reason: "no value recorded".to_string(),
            })
        }
        .boxed()
    }
}
