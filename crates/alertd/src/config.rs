//! Daemon configuration file.

use std::path::{Path, PathBuf};

use alert_engine::{AlertManagerConfig, AlertRule};
use anyhow::{Context, bail};
use serde::Deserialize;

/// Everything `alertd` needs to run an engine.
///
/// ```json
/// {
///   "engine": { "check_interval_ms": 10000 },
///   "channels": ["email", "slack"],
///   "metrics_file": "metrics.json",
///   "rules": [{ "name": "HighCPU", "type": "threshold", "metric": "cpu", "threshold": 80 }]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct EngineFile {
    /// Engine settings.
    #[serde(default)]
    pub engine: AlertManagerConfig,
    /// Channel ids bound to log-backed notification services.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    /// JSON object of current metric values. Relative paths are resolved
    /// against the directory of the configuration file.
    pub metrics_file: PathBuf,
    /// Rules to register on startup.
    #[serde(default)]
    pub rules: Vec<AlertRule>,
}

fn default_channels() -> Vec<String> {
    vec![alert_engine::types::DEFAULT_CHANNEL.to_string()]
}

impl EngineFile {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;

        let mut file = Self::from_json(&content)?;
        if file.metrics_file.is_relative() {
            if let Some(dir) = path.parent() {
                file.metrics_file = dir.join(&file.metrics_file);
            }
        }
        Ok(file)
    }

    /// Parses and validates a configuration document.
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let file: Self = serde_json::from_str(content).context("invalid config JSON")?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.engine.validate()?;

        if let Some(blank) = self.channels.iter().find(|c| c.trim().is_empty()) {
            bail!("channel id cannot be blank: {blank:?}");
        }

        if self.metrics_file.as_os_str().is_empty() {
            bail!("metrics_file cannot be empty");
        }

        Ok(())
    }
}
