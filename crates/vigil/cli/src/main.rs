//! Vigil CLI - Command-line interface for metric health evaluation
//!
//! Loads metric definitions and observations from files, runs one
//! evaluation cycle and prints:
//! - The composite health score, risk band and classified metrics
//! - Baseline drift per metric
//! - Anomalies raised by threshold and drift rules or external signals

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use vigil_health::{init_tracing, MonitorConfig, MonitorProfile, TracingConfig};

mod commands;
mod error;
mod output;

use commands::{anomalies, drift, evaluate};
use error::CliResult;

/// Vigil CLI application
#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil - Metric health, drift and risk scoring", long_about = None)]
#[command(version)]
struct Cli {
    /// Monitor configuration file (TOML)
    #[arg(short, long, env = "VIGIL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Configuration preset, used when no configuration file is given
    #[arg(short, long, value_enum, default_value = "standard", global = true)]
    profile: ProfileArg,

    /// Output format (table, json)
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    output: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Configuration presets
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProfileArg {
    Standard,
    FinancialClose,
    Development,
}

impl From<ProfileArg> for MonitorProfile {
    fn from(profile: ProfileArg) -> Self {
        match profile {
            ProfileArg::Standard => MonitorProfile::Standard,
            ProfileArg::FinancialClose => MonitorProfile::FinancialClose,
            ProfileArg::Development => MonitorProfile::Development,
        }
    }
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Evaluate metrics and show the health snapshot
    #[command(alias = "eval")]
    Evaluate(evaluate::EvaluateArgs),

    /// Show baseline drift per metric
    Drift(drift::DriftArgs),

    /// List anomalies
    Anomalies(anomalies::AnomaliesArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let mut tracing_config = TracingConfig::new("vigil-cli").with_log_level(level);
    if cli.json_logs {
        tracing_config = tracing_config.with_json_format();
    }
    if let Err(e) = init_tracing(&tracing_config) {
        eprintln!("warning: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::for_profile(cli.profile.into()),
    };
    // One-shot evaluation; the interval timer is never started.
    config.refresh.auto_refresh = false;

    match cli.command {
        Commands::Evaluate(args) => evaluate::execute(args, config, cli.output).await,
        Commands::Drift(args) => drift::execute(args, config, cli.output).await,
        Commands::Anomalies(args) => anomalies::execute(args, config, cli.output).await,
    }
}
