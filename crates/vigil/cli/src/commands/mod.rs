//! CLI command implementations

pub mod anomalies;
pub mod drift;
pub mod evaluate;

use std::path::{Path, PathBuf};

use clap::Args;
use serde::de::DeserializeOwned;
use tracing::debug;
use vigil_health::{HealthError, MonitorConfig, RiskMonitor, StaticRegistry};
use vigil_types::{CategoryFilter, ExternalSignal, HealthSnapshot, MetricCategory, Observation};

use crate::error::{CliError, CliResult};
use crate::output::print_warning;

/// Input files shared by every command
#[derive(Debug, Args)]
pub struct Inputs {
    /// Metric definitions (TOML, `[[metric]]` tables)
    #[arg(short, long, env = "VIGIL_DEFINITIONS")]
    pub definitions: PathBuf,

    /// Observations (JSON array of `{metric_id, value, timestamp}`)
    #[arg(short = 'O', long)]
    pub observations: Option<PathBuf>,

    /// External signals (JSON array)
    #[arg(short, long)]
    pub signals: Option<PathBuf>,
}

/// Category filter argument
#[derive(Debug, Args)]
pub struct CategoryArg {
    /// Only show metrics in this category
    #[arg(long)]
    pub category: Option<MetricCategory>,
}

impl CategoryArg {
    pub fn filter(&self) -> CategoryFilter {
        self.category.into()
    }
}

/// Build a monitor from the input files and run one evaluation cycle.
pub async fn evaluate_inputs(
    inputs: &Inputs,
    config: MonitorConfig,
) -> CliResult<(RiskMonitor, HealthSnapshot)> {
    let monitor = RiskMonitor::new(config)?;

    let registry = StaticRegistry::load(&inputs.definitions)?;
    let registered = monitor.load_definitions(&registry)?;
    debug!(count = registered, "Loaded metric definitions");

    if let Some(path) = &inputs.observations {
        let mut observations: Vec<Observation> = read_json(path)?;
        observations.sort_by_key(|o| o.timestamp);
        for observation in &observations {
            match monitor.ingest(observation) {
                Ok(_) => {}
                Err(HealthError::MetricNotFound(id)) => {
                    print_warning(&format!("skipping observation for unknown metric {}", id));
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!(count = observations.len(), "Ingested observations");
    }

    if let Some(path) = &inputs.signals {
        let signals: Vec<ExternalSignal> = read_json(path)?;
        for signal in &signals {
            monitor.ingest_signal(signal)?;
        }
        debug!(count = signals.len(), "Ingested external signals");
    }

    let snapshot = monitor.evaluate().await?;
    Ok((monitor, snapshot))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        CliError::InvalidInput(format!("reading {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&source)?)
}
