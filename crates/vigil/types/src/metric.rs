//! Metric definitions, observations and the stored metric record
//!
//! A `MetricDefinition` is static configuration supplied by the definition
//! registry. A `Metric` is the live record held by the metric store: the
//! definition plus the latest observation, the baseline and the value seen
//! by the previous evaluation cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MetricId;

/// Business domain a metric belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Performance,
    Financial,
    Security,
    Compliance,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 4] = [
        MetricCategory::Performance,
        MetricCategory::Financial,
        MetricCategory::Security,
        MetricCategory::Compliance,
    ];
}

impl std::fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricCategory::Performance => write!(f, "performance"),
            MetricCategory::Financial => write!(f, "financial"),
            MetricCategory::Security => write!(f, "security"),
            MetricCategory::Compliance => write!(f, "compliance"),
        }
    }
}

impl std::str::FromStr for MetricCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "performance" => Ok(MetricCategory::Performance),
            "financial" => Ok(MetricCategory::Financial),
            "security" => Ok(MetricCategory::Security),
            "compliance" => Ok(MetricCategory::Compliance),
            other => Err(format!("unknown metric category: {}", other)),
        }
    }
}

/// Which direction of movement is bad for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Error rate, latency: exceeding the threshold is bad.
    HigherIsWorse,
    /// Compliance score, reconciliation rate: falling below the threshold is bad.
    HigherIsBetter,
}

/// Selects which metrics a list operation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(MetricCategory),
}

impl CategoryFilter {
    pub fn matches(&self, category: MetricCategory) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => *wanted == category,
        }
    }
}

impl From<Option<MetricCategory>> for CategoryFilter {
    fn from(value: Option<MetricCategory>) -> Self {
        value.map(CategoryFilter::Only).unwrap_or_default()
    }
}

/// Errors raised while validating a metric definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("metric definition has an empty id")]
    EmptyId,

    #[error("metric {0} does not declare a polarity")]
    MissingPolarity(MetricId),

    #[error("metric {id} has invalid threshold {threshold}; must be finite and positive")]
    InvalidThreshold { id: MetricId, threshold: f64 },

    #[error("metric {id} has non-finite baseline {baseline}")]
    InvalidBaseline { id: MetricId, baseline: f64 },

    #[error("metric {0} is tagged integrity-critical but is not a financial metric")]
    IntegrityOutsideFinancial(MetricId),
}

/// Static configuration for one metric, as supplied by the definition registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: MetricId,

    /// Human-readable name. Defaults to the id when empty.
    #[serde(default)]
    pub name: String,

    pub category: MetricCategory,

    pub threshold: f64,

    /// Must be present; a definition without polarity is rejected.
    #[serde(default)]
    pub polarity: Option<Polarity>,

    /// Balance or reconciliation metric whose anomalies affect
    /// financial-statement integrity.
    #[serde(default)]
    pub integrity_critical: bool,

    #[serde(default)]
    pub unit: String,

    /// Optional starting baseline. When absent the first observation seeds it.
    #[serde(default)]
    pub baseline: Option<f64>,
}

impl MetricDefinition {
    pub fn new(
        id: impl Into<MetricId>,
        category: MetricCategory,
        threshold: f64,
        polarity: Polarity,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            category,
            threshold,
            polarity: Some(polarity),
            integrity_critical: false,
            unit: String::new(),
            baseline: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_baseline(mut self, baseline: f64) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn integrity_critical(mut self) -> Self {
        self.integrity_critical = true;
        self
    }

    /// Check the definition and return its declared polarity.
    pub fn validate(&self) -> Result<Polarity, DefinitionError> {
        if self.id.is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        let polarity = self
            .polarity
            .ok_or_else(|| DefinitionError::MissingPolarity(self.id.clone()))?;
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(DefinitionError::InvalidThreshold {
                id: self.id.clone(),
                threshold: self.threshold,
            });
        }
        if let Some(baseline) = self.baseline {
            if !baseline.is_finite() {
                return Err(DefinitionError::InvalidBaseline {
                    id: self.id.clone(),
                    baseline,
                });
            }
        }
        if self.integrity_critical && self.category != MetricCategory::Financial {
            return Err(DefinitionError::IntegrityOutsideFinancial(self.id.clone()));
        }
        Ok(polarity)
    }
}

/// A raw observation from the ingestion feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub metric_id: MetricId,
    pub value: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn new(metric_id: impl Into<MetricId>, value: f64) -> Self {
        Self {
            metric_id: metric_id.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A monitored metric as held by the metric store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: MetricId,
    pub name: String,
    pub category: MetricCategory,
    pub polarity: Polarity,
    pub integrity_critical: bool,
    pub threshold: f64,
    pub unit: String,

    /// Latest observed value; `None` until the first observation arrives.
    pub current_value: Option<f64>,

    /// Reference value for drift. Changed only by a baseline reset once seeded.
    pub baseline: Option<f64>,

    /// When the baseline was seeded or last reset.
    pub baseline_set_at: Option<DateTime<Utc>>,

    /// Value seen by the evaluation cycle before the latest one. Trend and
    /// "newly crossed" rules compare against it.
    pub previous_value: Option<f64>,

    /// Value seen by the latest evaluation cycle.
    pub evaluated_value: Option<f64>,

    pub observed_at: Option<DateTime<Utc>>,
}

impl Metric {
    /// Build a store record from a definition, validating it first.
    pub fn from_definition(definition: &MetricDefinition) -> Result<Self, DefinitionError> {
        let polarity = definition.validate()?;
        let name = if definition.name.trim().is_empty() {
            definition.id.to_string()
        } else {
            definition.name.clone()
        };

        Ok(Self {
            id: definition.id.clone(),
            name,
            category: definition.category,
            polarity,
            integrity_critical: definition.integrity_critical,
            threshold: definition.threshold,
            unit: definition.unit.clone(),
            current_value: None,
            baseline: definition.baseline,
            baseline_set_at: definition.baseline.map(|_| Utc::now()),
            previous_value: None,
            evaluated_value: None,
            observed_at: None,
        })
    }

    /// Set the current value directly. Mostly useful for tests and fixtures.
    pub fn with_value(mut self, value: f64) -> Self {
        self.current_value = Some(value);
        self
    }

    pub fn with_baseline(mut self, baseline: f64) -> Self {
        self.baseline = Some(baseline);
        self.baseline_set_at = Some(Utc::now());
        self
    }

    /// Whether anomalies on this metric affect trial-balance integrity.
    pub fn affects_financial_integrity(&self) -> bool {
        self.category == MetricCategory::Financial && self.integrity_critical
    }
}
