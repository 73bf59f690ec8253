//! Error types for vigil-health crate.
//!
//! Defines monitoring, evaluation and scheduling errors.

use thiserror::Error;
use vigil_types::{AnomalyId, DefinitionError, HealthSnapshot, MetricId};

/// Errors that can occur while monitoring metrics.
#[derive(Debug, Error)]
pub enum HealthError {
    /// Metric is not registered in the store.
    #[error("metric not found: {0}")]
    MetricNotFound(MetricId),

    /// Anomaly id is not present in the history.
    #[error("anomaly not found: {0}")]
    AnomalyNotFound(AnomalyId),

    /// Metric has no usable observation for the requested operation.
    #[error("metric {0} has no usable observation")]
    NoObservation(MetricId),

    /// External signal cannot be attributed to a category.
    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    /// Metric definition or engine configuration is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No evaluation cycle has completed yet.
    #[error("no evaluation has completed yet")]
    NotEvaluated,

    /// The latest snapshot is older than the staleness limit.
    #[error("snapshot is stale: generated {age_ms}ms ago")]
    StaleData {
        age_ms: u64,
        last_snapshot: Option<Box<HealthSnapshot>>,
    },

    /// An on-demand evaluation did not finish in time.
    #[error("evaluation timed out after {timeout_ms}ms")]
    EvaluationTimeout {
        timeout_ms: u64,
        last_snapshot: Option<Box<HealthSnapshot>>,
    },

    /// The observation feed failed to deliver.
    #[error("observation feed error: {0}")]
    Feed(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HealthError {
    /// The last good snapshot carried by a stale-data or timeout error.
    pub fn last_snapshot(&self) -> Option<&HealthSnapshot> {
        match self {
            HealthError::StaleData { last_snapshot, .. }
            | HealthError::EvaluationTimeout { last_snapshot, .. } => last_snapshot.as_deref(),
            _ => None,
        }
    }

    /// Whether the error means the data is old rather than wrong.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            HealthError::StaleData { .. } | HealthError::EvaluationTimeout { .. }
        )
    }
}

impl From<DefinitionError> for HealthError {
    fn from(err: DefinitionError) -> Self {
        HealthError::InvalidConfiguration(err.to_string())
    }
}

impl From<toml::de::Error> for HealthError {
    fn from(err: toml::de::Error) -> Self {
        HealthError::InvalidConfiguration(err.to_string())
    }
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;
