//! Bounded per-metric sample history.
//!
//! Anomaly and trend rules compare the current value against recent
//! samples of the same metric. [`MetricHistoryStore`] keeps a FIFO window
//! of at most `capacity` samples per metric; the oldest sample is evicted
//! first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Default number of samples kept per metric.
pub const DEFAULT_METRIC_HISTORY_SIZE: usize = 100;

/// A copy of the samples recorded for one metric, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricWindow {
    /// Sample values.
    pub values: Vec<f64>,
    /// Sample timestamps, parallel to `values`.
    pub timestamps: Vec<DateTime<Utc>>,
}

impl MetricWindow {
    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the window holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Population mean of the samples.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population standard deviation of the samples.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / self.values.len() as f64;
        variance.sqrt()
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: f64,
    timestamp: DateTime<Utc>,
}

/// Thread-safe store of recent samples per metric.
#[derive(Debug, Clone)]
pub struct MetricHistoryStore {
    capacity: usize,
    series: Arc<RwLock<HashMap<String, VecDeque<Sample>>>>,
}

impl MetricHistoryStore {
    /// Creates a store keeping at most `capacity` samples per metric.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the per-metric capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a sample, evicting the oldest one when the window is full.
    pub fn record(&self, metric: &str, value: f64, timestamp: DateTime<Utc>) {
        let mut series = self.series.write();
        let window = series
            .entry(metric.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(64)));

        window.push_back(Sample { value, timestamp });
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    /// Returns a copy of the samples for `metric`, or `None` if nothing was recorded.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<MetricWindow> {
        let series = self.series.read();
        let window = series.get(metric)?;
        Some(MetricWindow {
            values: window.iter().map(|s| s.value).collect(),
            timestamps: window.iter().map(|s| s.timestamp).collect(),
        })
    }

    /// Returns the number of metrics with recorded samples.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.series.read().len()
    }

    /// Drops all recorded samples.
    pub fn clear(&self) {
        self.series.write().clear();
    }
}

impl Default for MetricHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC_HISTORY_SIZE)
    }
}
