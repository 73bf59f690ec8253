//! Risk monitor.
//!
//! The public surface consumed by presentation layers: evaluation, listing,
//! baseline resets, acknowledgements and auto-refresh control. View state
//! such as the selected category is passed per call and never stored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, instrument};
use vigil_types::{
    AnomalyEvent, AnomalyId, CategoryFilter, ClassifiedMetric, DriftRecord, ExternalSignal,
    HealthSnapshot, Metric, MetricDefinition, MetricId, Observation,
};

use crate::config::MonitorConfig;
use crate::engine::{HealthEngine, MonitorEvent};
use crate::error::{HealthError, HealthResult};
use crate::ports::{DefinitionRegistry, ObservationFeed};
use crate::scheduler::{RefreshScheduler, SchedulerState, TriggerOutcome};

/// Monitors one target's metrics and publishes health snapshots.
#[derive(Debug)]
pub struct RiskMonitor {
    engine: Arc<HealthEngine>,
    scheduler: Arc<RefreshScheduler>,
}

impl RiskMonitor {
    /// Create a monitor fed only through [`RiskMonitor::ingest`].
    pub fn new(config: MonitorConfig) -> HealthResult<Self> {
        Self::build(config, None)
    }

    /// Create a monitor that drains `feed` before every evaluation.
    pub fn with_feed(config: MonitorConfig, feed: Arc<dyn ObservationFeed>) -> HealthResult<Self> {
        Self::build(config, Some(feed))
    }

    fn build(config: MonitorConfig, feed: Option<Arc<dyn ObservationFeed>>) -> HealthResult<Self> {
        let engine = Arc::new(HealthEngine::new(config)?);
        let scheduler = RefreshScheduler::new(engine.clone(), feed);
        Ok(Self { engine, scheduler })
    }

    pub fn engine(&self) -> &Arc<HealthEngine> {
        &self.engine
    }

    pub fn config(&self) -> &MonitorConfig {
        self.engine.config()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.engine.subscribe()
    }

    pub fn load_definitions(&self, registry: &dyn DefinitionRegistry) -> HealthResult<usize> {
        self.engine.load_definitions(registry)
    }

    pub fn register(&self, definition: &MetricDefinition) -> HealthResult<Metric> {
        self.engine.register(definition)
    }

    pub fn ingest(&self, observation: &Observation) -> HealthResult<bool> {
        self.engine.ingest(observation)
    }

    pub fn ingest_signal(&self, signal: &ExternalSignal) -> HealthResult<AnomalyEvent> {
        self.engine.ingest_signal(signal)
    }

    /// Start scheduled evaluation if auto-refresh is configured on.
    pub fn start(&self) -> HealthResult<()> {
        self.scheduler.start()
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Trigger an evaluation and report whether it ran or was coalesced.
    pub async fn trigger(&self) -> HealthResult<TriggerOutcome> {
        self.scheduler.trigger().await
    }

    /// Evaluate now and return the resulting snapshot.
    ///
    /// If a cycle is already in flight no second cycle runs; the caller
    /// receives the in-flight cycle's snapshot instead. Either way the wait
    /// is bounded by the evaluation timeout.
    #[instrument(skip(self))]
    pub async fn evaluate(&self) -> HealthResult<HealthSnapshot> {
        let started = Instant::now();
        let mut events = self.engine.subscribe();

        match self.scheduler.trigger().await? {
            TriggerOutcome::Evaluated(snapshot) => Ok(snapshot),
            TriggerOutcome::Coalesced => {
                let timeout = self.config().refresh.evaluation_timeout();
                let remaining = timeout.saturating_sub(started.elapsed());
                debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "Waiting for in-flight evaluation"
                );
                let wait = async {
                    loop {
                        match events.recv().await {
                            Ok(MonitorEvent::SnapshotPublished(snapshot)) => return Some(snapshot),
                            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => return None,
                        }
                    }
                };
                match tokio::time::timeout(remaining, wait).await {
                    Ok(Some(snapshot)) => Ok(snapshot),
                    Ok(None) => Err(HealthError::Internal("event channel closed".to_string())),
                    Err(_) => Err(HealthError::EvaluationTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                        last_snapshot: self.engine.last_snapshot().map(Box::new),
                    }),
                }
            }
        }
    }

    /// Latest snapshot, or `StaleData` carrying it when it is older than
    /// `stale_factor × interval`.
    pub fn snapshot(&self) -> HealthResult<HealthSnapshot> {
        self.scheduler.fresh_snapshot()
    }

    /// Latest snapshot regardless of age.
    pub fn last_snapshot(&self) -> Option<HealthSnapshot> {
        self.engine.last_snapshot()
    }

    pub fn list_classified_metrics(&self, filter: CategoryFilter) -> Vec<ClassifiedMetric> {
        self.engine.list_classified(filter)
    }

    /// Anomalies newest first, optionally only those at or after `since`.
    pub fn list_anomalies(&self, since: Option<DateTime<Utc>>) -> Vec<AnomalyEvent> {
        self.engine.list_anomalies(since)
    }

    pub fn list_drift(&self, filter: CategoryFilter) -> Vec<DriftRecord> {
        self.engine.list_drift(filter)
    }

    /// Copy the metric's current value into its baseline.
    pub fn reset_baseline(&self, metric_id: &MetricId) -> HealthResult<f64> {
        self.engine.reset_baseline(metric_id)
    }

    pub fn acknowledge_anomaly(&self, id: AnomalyId) -> HealthResult<AnomalyEvent> {
        self.engine.acknowledge_anomaly(id)
    }

    /// Turn scheduled evaluation on or off. Must be called from within a
    /// tokio runtime when enabling.
    pub fn set_auto_refresh(&self, enabled: bool, interval_ms: Option<u64>) -> HealthResult<()> {
        self.scheduler
            .set_auto_refresh(enabled, interval_ms.map(Duration::from_millis))
    }
}
