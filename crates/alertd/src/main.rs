//! alertd - alert engine daemon
//!
//! Loads alert rules from a configuration file, polls a metrics file on a
//! fixed interval and logs every alert raised.

mod config;
mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alert_engine::{AlertEvent, AlertManager, LogChannel};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::EngineFile;
use crate::source::FileMetricSource;

#[derive(Parser)]
#[command(name = "alertd")]
#[command(about = "Rule-based alert evaluation daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the evaluation scheduler until interrupted
    Run {
        /// Path to config file
        #[arg(short, long, env = "ALERTD_CONFIG", default_value = "alertd.json")]
        config: PathBuf,
    },

    /// Validate a config file and list its rules
    Validate {
        /// Path to config file
        #[arg(short, long, env = "ALERTD_CONFIG", default_value = "alertd.json")]
        config: PathBuf,
    },

    /// Run a single evaluation tick and print the summary as JSON
    Check {
        /// Path to config file
        #[arg(short, long, env = "ALERTD_CONFIG", default_value = "alertd.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("alertd=info".parse()?)
                .add_directive("alert_engine=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(&config).await?,
        Commands::Validate { config } => validate(&config)?,
        Commands::Check { config } => check(&config).await?,
    }

    Ok(())
}

/// Builds a manager from the config file with all rules and channels registered.
fn build_manager(path: &Path) -> anyhow::Result<AlertManager> {
    let file = EngineFile::load(path)?;
    info!(
        config = %path.display(),
        metrics_file = %file.metrics_file.display(),
        rules = file.rules.len(),
        "loaded config"
    );

    let source = FileMetricSource::new(&file.metrics_file);
    let manager = AlertManager::new(file.engine, Arc::new(source))?;

    for channel in &file.channels {
        manager.add_channel(Arc::new(LogChannel::new(channel.as_str())));
    }

    for rule in file.rules {
        let name = rule.name.clone();
        let unknown: Vec<&String> = rule
            .channels
            .iter()
            .filter(|c| !file.channels.contains(*c))
            .collect();
        if !unknown.is_empty() {
            warn!(rule = %name, channels = ?unknown, "rule references unconfigured channels");
        }

        manager
            .add_rule(rule)
            .map_err(|e| anyhow::anyhow!("rule '{name}': {e}"))?;
    }

    Ok(manager)
}

async fn run(path: &Path) -> anyhow::Result<()> {
    let manager = build_manager(path)?;
    let mut events = manager.subscribe();

    manager.start()?;
    info!(name = %manager.config().name, rules = manager.rule_count(), "alertd running");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("interrupt received, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => warn!(missed, "alert event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.stop();
    Ok(())
}

fn log_event(event: &AlertEvent) {
    let alert = event.alert();
    info!(
        event = event.kind(),
        alert_id = %alert.id,
        name = %alert.name,
        severity = %alert.severity,
        status = %alert.status,
        value = %alert.value,
        "alert event"
    );
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let manager = build_manager(path)?;

    println!("Config OK: {}", path.display());
    println!("Channels: {}", manager.channels().join(", "));
    println!();
    println!("{:<38} {:<24} {:<10} {:<10} {:<8}", "ID", "NAME", "TYPE", "SEVERITY", "ENABLED");
    for rule in manager.get_rules() {
        println!(
            "{:<38} {:<24} {:<10} {:<10} {:<8}",
            rule.id,
            rule.name,
            rule.rule_type.as_str(),
            rule.severity.as_str(),
            rule.enabled
        );
    }

    Ok(())
}

async fn check(path: &Path) -> anyhow::Result<()> {
    let manager = build_manager(path)?;
    let summary = manager.check_all_rules().await;

    let report = serde_json::json!({
        "summary": summary,
        "alerts": manager.active_alerts(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
