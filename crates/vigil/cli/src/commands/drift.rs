//! Drift command

use clap::Args;
use vigil_health::MonitorConfig;

use super::{evaluate_inputs, CategoryArg, Inputs};
use crate::error::CliResult;
use crate::output::{print_json, print_table, DriftRow, OutputFormat};

/// Arguments for `vigil drift`
#[derive(Debug, Args)]
pub struct DriftArgs {
    #[command(flatten)]
    pub inputs: Inputs,

    #[command(flatten)]
    pub category: CategoryArg,

    /// Only show metrics beyond the drifting threshold
    #[arg(long)]
    pub drifting: bool,
}

/// Execute the drift command
pub async fn execute(
    args: DriftArgs,
    config: MonitorConfig,
    format: OutputFormat,
) -> CliResult<()> {
    let (monitor, _) = evaluate_inputs(&args.inputs, config).await?;

    let mut records = monitor.list_drift(args.category.filter());
    if args.drifting {
        records.retain(|r| r.is_drifting());
    }

    match format {
        OutputFormat::Json => print_json(&records),
        OutputFormat::Table => {
            print_table(records.iter().map(DriftRow::from).collect());
            Ok(())
        }
    }
}
