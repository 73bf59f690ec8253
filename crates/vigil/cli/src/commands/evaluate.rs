//! Evaluate command

use clap::Args;
use serde::Serialize;
use vigil_health::MonitorConfig;
use vigil_types::{ClassifiedMetric, HealthSnapshot};

use super::{evaluate_inputs, CategoryArg, Inputs};
use crate::error::CliResult;
use crate::output::{print_json, print_snapshot, print_table, MetricRow, OutputFormat};

/// Arguments for `vigil evaluate`
#[derive(Debug, Args)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub inputs: Inputs,

    #[command(flatten)]
    pub category: CategoryArg,
}

#[derive(Serialize)]
struct EvaluateReport {
    snapshot: HealthSnapshot,
    metrics: Vec<ClassifiedMetric>,
}

/// Execute the evaluate command
pub async fn execute(
    args: EvaluateArgs,
    config: MonitorConfig,
    format: OutputFormat,
) -> CliResult<()> {
    let (monitor, snapshot) = evaluate_inputs(&args.inputs, config).await?;
    let metrics = monitor.list_classified_metrics(args.category.filter());

    match format {
        OutputFormat::Json => print_json(&EvaluateReport { snapshot, metrics }),
        OutputFormat::Table => {
            print_snapshot(&snapshot);
            print_table(metrics.iter().map(MetricRow::from).collect());
            Ok(())
        }
    }
}
