//! Anomaly listing command

use chrono::{DateTime, Utc};
use clap::Args;
use vigil_health::MonitorConfig;

use super::{evaluate_inputs, Inputs};
use crate::error::CliResult;
use crate::output::{print_json, print_table, AnomalyRow, OutputFormat};

/// Arguments for `vigil anomalies`
#[derive(Debug, Args)]
pub struct AnomaliesArgs {
    #[command(flatten)]
    pub inputs: Inputs,

    /// Only anomalies at or after this time (RFC 3339)
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Only unresolved anomalies
    #[arg(long)]
    pub open: bool,
}

/// Execute the anomalies command
pub async fn execute(
    args: AnomaliesArgs,
    config: MonitorConfig,
    format: OutputFormat,
) -> CliResult<()> {
    let (monitor, _) = evaluate_inputs(&args.inputs, config).await?;

    let mut anomalies = monitor.list_anomalies(args.since);
    if args.open {
        anomalies.retain(|a| a.is_open());
    }

    match format {
        OutputFormat::Json => print_json(&anomalies),
        OutputFormat::Table => {
            print_table(anomalies.iter().map(AnomalyRow::from).collect());
            Ok(())
        }
    }
}
