//! # Vigil Health - Risk Scoring and Drift Detection
//!
//! This crate turns raw metric observations into classified metrics, baseline
//! drift records, anomaly events and a composite 0-100 health index.
//!
//! ## Pipeline
//!
//! Each evaluation cycle runs, over every registered metric:
//!
//! 1. **Status classification**: value against threshold, polarity-adjusted,
//!    into healthy / degraded / critical with a severity and trend
//! 2. **Drift detection**: signed percentage deviation from the baseline
//! 3. **Anomaly rules**: critical crossings and threshold drift raise
//!    anomalies; cleared conditions resolve them after a debounce
//! 4. **Composite scoring**: weighted penalties from 100, mapped to a
//!    LOW / ELEVATED / CRITICAL band with a critical-metric override
//!
//! ## Key Components
//!
//! - [`RiskMonitor`]: public surface for presentation layers
//! - [`HealthEngine`]: the synchronous evaluation pipeline
//! - [`RefreshScheduler`]: interval and on-demand triggers, coalesced
//! - [`DefinitionRegistry`] and [`ObservationFeed`]: collaborator ports
//!
//! ## Example
//!
//! ```rust,no_run
//! use vigil_health::{MonitorConfig, MonitorProfile, RiskMonitor, StaticRegistry};
//! use vigil_types::{CategoryFilter, Observation};
//!
//! # async fn example() -> vigil_health::HealthResult<()> {
//! let monitor = RiskMonitor::new(MonitorConfig::for_profile(MonitorProfile::FinancialClose))?;
//!
//! let registry = StaticRegistry::from_toml_str(r#"
//!     [[metric]]
//!     id = "error_rate"
//!     category = "performance"
//!     threshold = 0.05
//!     polarity = "higher_is_worse"
//! "#)?;
//! monitor.load_definitions(&registry)?;
//!
//! monitor.ingest(&Observation::new("error_rate", 0.051))?;
//! let snapshot = monitor.evaluate().await?;
//! println!("{} ({})", snapshot.composite_score, snapshot.risk_band);
//!
//! for metric in monitor.list_classified_metrics(CategoryFilter::All) {
//!     println!("{}: {}", metric.metric.id, metric.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod anomaly;
pub mod classifier;
pub mod config;
pub mod drift;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod ports;
pub mod scheduler;
pub mod scorer;
pub mod store;
pub mod telemetry;

// Re-export main types
pub use anomaly::{AnomalyClassifier, AnomalyHistory, CycleAnomalies, MetricEvaluation};
pub use classifier::{classify, polarity_ratio, Classification, StatusClassifier};
pub use config::{
    AnomalyConfig, ClassificationConfig, DriftConfig, MonitorConfig, MonitorProfile,
    RefreshConfig, ScoringConfig, ScoringWeights,
};
pub use drift::{drift_percent, DriftDetector};
pub use engine::{HealthEngine, MonitorEvent};
pub use error::{HealthError, HealthResult};
pub use monitor::RiskMonitor;
pub use ports::{DefinitionRegistry, ObservationFeed, QueueFeed, StaticRegistry};
pub use scheduler::{RefreshScheduler, SchedulerState, TriggerOutcome};
pub use scorer::{CompositeScorer, ScoreInputs};
pub use store::MetricStore;
pub use telemetry::{init_tracing, TracingConfig};
