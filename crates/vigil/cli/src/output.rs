//! Output formatting utilities

use colored::*;
use serde::Serialize;
use tabled::{Table, Tabled};
use vigil_types::{
    AnomalyEvent, ClassifiedMetric, DriftLevel, DriftRecord, HealthSnapshot, MetricStatus,
    RiskBand, Severity,
};

use crate::error::CliResult;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No results".dimmed());
    } else {
        println!("{}", Table::new(rows));
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(data: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message);
}

fn colorize_band(band: RiskBand) -> ColoredString {
    match band {
        RiskBand::Low => band.to_string().green(),
        RiskBand::Elevated => band.to_string().yellow(),
        RiskBand::Critical => band.to_string().red().bold(),
    }
}

/// Print the snapshot header
pub fn print_snapshot(snapshot: &HealthSnapshot) {
    let capped = if snapshot.band_capped {
        " (capped by critical condition)".dimmed().to_string()
    } else {
        String::new()
    };
    println!(
        "Health score: {}  Risk: {}{}",
        snapshot.composite_score.to_string().bold(),
        colorize_band(snapshot.risk_band),
        capped
    );
    println!(
        "Critical: {}  High: {}  Drifting: {} ({} significant)  Open anomalies: {}  Unknown: {}",
        snapshot.critical_count,
        snapshot.high_count,
        snapshot.drift_count,
        snapshot.significant_drift_count,
        snapshot.unresolved_anomaly_count,
        snapshot.unknown_count
    );
    println!();
}

fn format_number(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) if unit.is_empty() => format!("{}", v),
        Some(v) => format!("{} {}", v, unit),
        None => "-".to_string(),
    }
}

#[derive(Tabled)]
pub struct MetricRow {
    #[tabled(rename = "METRIC")]
    id: String,
    #[tabled(rename = "CATEGORY")]
    category: String,
    #[tabled(rename = "VALUE")]
    value: String,
    #[tabled(rename = "THRESHOLD")]
    threshold: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "SEVERITY")]
    severity: String,
    #[tabled(rename = "TREND")]
    trend: String,
}

impl From<&ClassifiedMetric> for MetricRow {
    fn from(m: &ClassifiedMetric) -> Self {
        let status = match m.status {
            MetricStatus::Healthy => m.status.to_string().green().to_string(),
            MetricStatus::Degraded => m.status.to_string().yellow().to_string(),
            MetricStatus::Critical => m.status.to_string().red().to_string(),
            MetricStatus::Unknown => m.status.to_string().dimmed().to_string(),
        };
        Self {
            id: m.metric.id.to_string(),
            category: m.metric.category.to_string(),
            value: format_number(m.metric.current_value, &m.metric.unit),
            threshold: format_number(Some(m.metric.threshold), &m.metric.unit),
            status,
            severity: m
                .severity
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            trend: m.trend.to_string(),
        }
    }
}

#[derive(Tabled)]
pub struct DriftRow {
    #[tabled(rename = "METRIC")]
    metric: String,
    #[tabled(rename = "BASELINE")]
    baseline: f64,
    #[tabled(rename = "CURRENT")]
    current: f64,
    #[tabled(rename = "DRIFT")]
    drift: String,
    #[tabled(rename = "DIRECTION")]
    direction: String,
    #[tabled(rename = "WINDOW")]
    window: String,
}

impl From<&DriftRecord> for DriftRow {
    fn from(d: &DriftRecord) -> Self {
        let percent = format!("{:+.2}%", d.drift_percent);
        let drift = match d.level {
            DriftLevel::Stable => percent,
            DriftLevel::Drifting => percent.yellow().to_string(),
            DriftLevel::Significant => percent.red().to_string(),
        };
        Self {
            metric: d.metric_id.to_string(),
            baseline: d.baseline,
            current: d.current,
            drift,
            direction: d.direction.to_string(),
            window: d.window_label.clone(),
        }
    }
}

#[derive(Tabled)]
pub struct AnomalyRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "SEVERITY")]
    severity: String,
    #[tabled(rename = "CATEGORY")]
    category: String,
    #[tabled(rename = "TITLE")]
    title: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "TB IMPACT")]
    tb_impact: String,
}

impl From<&AnomalyEvent> for AnomalyRow {
    fn from(a: &AnomalyEvent) -> Self {
        let severity = match a.severity {
            Severity::Critical => a.severity.to_string().red().bold().to_string(),
            Severity::High => a.severity.to_string().red().to_string(),
            Severity::Medium => a.severity.to_string().yellow().to_string(),
            Severity::Low => a.severity.to_string(),
        };
        let state = if a.is_open() {
            "open".to_string()
        } else {
            "resolved".dimmed().to_string()
        };
        Self {
            id: a.id.as_uuid().to_string(),
            time: a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            severity,
            category: a.category.to_string(),
            title: a.title.clone(),
            state,
            tb_impact: if a.financial_integrity_impact { "yes" } else { "no" }.to_string(),
        }
    }
}
