//! Metric source backed by a JSON file.

use std::collections::HashMap;
use std::path::PathBuf;

use alert_engine::{AlertError, BoxFuture, MetricSource, MetricValue};
use futures::FutureExt;

/// Reads metric values from a JSON object on disk.
///
/// The file is re-read on every fetch so an external collector can rewrite
/// it between evaluation ticks.
#[derive(Debug, Clone)]
pub struct FileMetricSource {
    path: PathBuf,
}

impl FileMetricSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self, metric: &str) -> alert_engine::Result<MetricValue> {
        let fetch_error = |reason: String| AlertError::MetricFetch {
            metric: metric.to_string(),
            reason,
        };

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            fetch_error(format!("failed to read '{}': {e}", self.path.display()))
        })?;

        let mut values: HashMap<String, MetricValue> = serde_json::from_str(&content)
            .map_err(|e| fetch_error(format!("invalid metrics file: {e}")))?;

        values
            .remove(metric)
            .ok_or_else(|| fetch_error("metric not present".to_string()))
    }
}

impl MetricSource for FileMetricSource {
    fn get_value<'a>(&'a self, metric: &'a str) -> BoxFuture<'a, alert_engine::Result<MetricValue>> {
        self.read(metric).boxed()
    }
}
