//! # Vigil Types
//!
//! Core data model for the Vigil risk and health scoring engine.
//!
//! - [`Metric`] and [`MetricDefinition`]: what is monitored and how
//! - [`ClassifiedMetric`]: status, severity and trend for one cycle
//! - [`DriftRecord`]: signed deviation from the recorded baseline
//! - [`AnomalyEvent`]: structured record of a fired rule or external signal
//! - [`HealthSnapshot`]: composite 0-100 health index and risk band
//!
//! Statuses, severities and bands are closed enums so classification rules
//! can be matched exhaustively.

pub mod anomaly;
pub mod classification;
pub mod drift;
pub mod ids;
pub mod metric;
pub mod snapshot;

pub use anomaly::{AnomalyEvent, AnomalyTrigger, ExternalSignal, Resolution};
pub use classification::{ClassifiedMetric, MetricStatus, Severity, Trend};
pub use drift::{DriftDirection, DriftLevel, DriftRecord};
pub use ids::{AnomalyId, MetricId};
pub use metric::{
    CategoryFilter, DefinitionError, Metric, MetricCategory, MetricDefinition, Observation,
    Polarity,
};
pub use snapshot::{HealthSnapshot, RiskBand};
