//! Anomaly events and external signals
//!
//! An anomaly is created when a threshold or drift rule fires, or when an
//! external collaborator reports a problem directly. Once created it is
//! immutable apart from the one-way transition into the resolved state.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnomalyId, MetricCategory, MetricId, Severity};

/// The rule that produced an anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyTrigger {
    /// The metric newly entered critical status.
    CriticalCrossing,
    /// Drift beyond the significant-drift threshold.
    SignificantDrift,
    /// Drift beyond the drifting threshold but not significant.
    ModerateDrift,
    /// Reported directly by an external collaborator.
    ExternalSignal { source: String },
}

impl AnomalyTrigger {
    /// Whether the engine can observe the triggering condition clearing.
    pub fn is_condition_based(&self) -> bool {
        !matches!(self, AnomalyTrigger::ExternalSignal { .. })
    }
}

impl std::fmt::Display for AnomalyTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyTrigger::CriticalCrossing => write!(f, "critical-crossing"),
            AnomalyTrigger::SignificantDrift => write!(f, "significant-drift"),
            AnomalyTrigger::ModerateDrift => write!(f, "moderate-drift"),
            AnomalyTrigger::ExternalSignal { source } => write!(f, "signal:{}", source),
        }
    }
}

/// How an anomaly was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Closed by an explicit acknowledgement call.
    Acknowledged,
    /// The triggering condition stayed clear for the configured number of cycles.
    ConditionCleared,
}

/// A structured anomaly record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub id: AnomalyId,
    pub timestamp: DateTime<Utc>,
    pub category: MetricCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub affected_systems: BTreeSet<String>,
    pub auto_resolved: bool,
    pub financial_integrity_impact: bool,

    /// Metric the anomaly concerns, if any.
    pub metric_id: Option<MetricId>,
    pub trigger: AnomalyTrigger,
    pub resolution: Option<Resolution>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AnomalyEvent {
    pub fn is_open(&self) -> bool {
        !self.auto_resolved
    }
}

/// A problem reported by an external collaborator, e.g. a reconciliation
/// mismatch found by the ledger system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSignal {
    /// Reporting system, e.g. "ledger-reconciler".
    pub source: String,

    /// Metric the signal concerns. Supplies category and integrity tagging.
    #[serde(default)]
    pub metric_id: Option<MetricId>,

    /// Category for signals not tied to a metric.
    #[serde(default)]
    pub category: Option<MetricCategory>,

    pub severity: Severity,
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub affected_systems: BTreeSet<String>,

    /// For signals not tied to a metric: whether the signal concerns a
    /// balance or reconciliation figure.
    #[serde(default)]
    pub integrity_critical: bool,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ExternalSignal {
    pub fn new(source: impl Into<String>, severity: Severity, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            metric_id: None,
            category: None,
            severity,
            title: title.into(),
            description: String::new(),
            affected_systems: BTreeSet::new(),
            integrity_critical: false,
            timestamp: Utc::now(),
        }
    }

    pub fn for_metric(mut self, metric_id: impl Into<MetricId>) -> Self {
        self.metric_id = Some(metric_id.into());
        self
    }

    pub fn in_category(mut self, category: MetricCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn affecting(mut self, system: impl Into<String>) -> Self {
        self.affected_systems.insert(system.into());
        self
    }

    pub fn integrity_critical(mut self) -> Self {
        self.integrity_critical = true;
        self
    }
}
