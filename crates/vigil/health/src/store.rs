//! Metric store.
//!
//! Holds the current observed value, baseline and previous-cycle value of
//! every monitored metric. Metrics are listed in registration order and are
//! never removed while monitored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};
use vigil_types::{CategoryFilter, Metric, MetricDefinition, MetricId, Observation};

use crate::error::{HealthError, HealthResult};

#[derive(Debug, Default)]
struct StoreInner {
    metrics: Vec<Metric>,
    index: HashMap<MetricId, usize>,
}

impl StoreInner {
    fn position(&self, id: &MetricId) -> HealthResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| HealthError::MetricNotFound(id.clone()))
    }
}

/// Insertion-ordered store of monitored metrics.
#[derive(Debug, Default)]
pub struct MetricStore {
    inner: RwLock<StoreInner>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric from its definition.
    ///
    /// Re-registering an existing id updates its static configuration and
    /// keeps its observation, baseline and position.
    pub fn register(&self, definition: &MetricDefinition) -> HealthResult<Metric> {
        Ok(self.upsert(Metric::from_definition(definition)?))
    }

    /// Insert a metric, or merge it into the stored record with the same id.
    ///
    /// On update only the static configuration and a newer observation are
    /// taken from `metric`. A stored baseline and the cycle values are kept;
    /// a missing baseline is seeded as on ingest.
    pub fn upsert(&self, metric: Metric) -> Metric {
        let mut inner = self.inner.write();

        if let Some(&pos) = inner.index.get(&metric.id) {
            let existing = &mut inner.metrics[pos];
            existing.name = metric.name;
            existing.category = metric.category;
            existing.polarity = metric.polarity;
            existing.integrity_critical = metric.integrity_critical;
            existing.threshold = metric.threshold;
            existing.unit = metric.unit;

            if let Some(value) = metric.current_value {
                let newer = match (existing.observed_at, metric.observed_at) {
                    (Some(stored), Some(incoming)) => incoming >= stored,
                    _ => true,
                };
                if newer {
                    existing.current_value = Some(value);
                    existing.observed_at = metric.observed_at.or(existing.observed_at);
                }
            }

            if existing.baseline.is_none() {
                seed_baseline(existing, metric.baseline, metric.baseline_set_at);
            }
            debug!(metric_id = %existing.id, "Updated metric");
            return existing.clone();
        }

        let mut fresh = Metric {
            previous_value: None,
            evaluated_value: None,
            ..metric
        };
        if fresh.baseline.is_none() {
            seed_baseline(&mut fresh, None, None);
        }
        info!(metric_id = %fresh.id, category = %fresh.category, "Registered metric");
        let pos = inner.metrics.len();
        inner.index.insert(fresh.id.clone(), pos);
        inner.metrics.push(fresh.clone());
        fresh
    }

    pub fn get(&self, id: &MetricId) -> HealthResult<Metric> {
        let inner = self.inner.read();
        let pos = inner.position(id)?;
        Ok(inner.metrics[pos].clone())
    }

    pub fn contains(&self, id: &MetricId) -> bool {
        self.inner.read().index.contains_key(id)
    }

    /// Metrics matching the filter, in registration order.
    pub fn list(&self, filter: CategoryFilter) -> Vec<Metric> {
        self.inner
            .read()
            .metrics
            .iter()
            .filter(|m| filter.matches(m.category))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an observation to its metric.
    ///
    /// Returns `false` when the observation is older than the one already
    /// applied and was ignored. The first finite observation seeds a missing
    /// baseline.
    pub fn ingest(&self, observation: &Observation) -> HealthResult<bool> {
        let mut inner = self.inner.write();
        let pos = inner.position(&observation.metric_id)?;
        let metric = &mut inner.metrics[pos];

        if let Some(observed_at) = metric.observed_at {
            if observation.timestamp < observed_at {
                debug!(
                    metric_id = %metric.id,
                    "Ignoring out-of-order observation"
                );
                return Ok(false);
            }
        }

        metric.current_value = Some(observation.value);
        metric.observed_at = Some(observation.timestamp);

        if metric.baseline.is_none() {
            seed_baseline(metric, None, None);
        }

        Ok(true)
    }

    /// Copy the current value into the baseline. The only way a seeded
    /// baseline changes.
    pub fn reset_baseline(&self, id: &MetricId) -> HealthResult<f64> {
        let mut inner = self.inner.write();
        let pos = inner.position(id)?;
        let metric = &mut inner.metrics[pos];

        let current = metric
            .current_value
            .filter(|v| v.is_finite())
            .ok_or_else(|| HealthError::NoObservation(id.clone()))?;

        metric.baseline = Some(current);
        metric.baseline_set_at = Some(Utc::now());
        info!(metric_id = %id, baseline = current, "Baseline reset");
        Ok(current)
    }

    /// Start an evaluation cycle: the value evaluated last cycle becomes the
    /// previous value, and the current value becomes the evaluated one.
    pub(crate) fn begin_cycle(&self) {
        let mut inner = self.inner.write();
        for metric in inner.metrics.iter_mut() {
            metric.previous_value = metric.evaluated_value;
            metric.evaluated_value = metric.current_value.filter(|v| v.is_finite());
        }
    }
}

/// Fill a missing baseline from `baseline`, or else from the current value
/// when it is finite.
fn seed_baseline(metric: &mut Metric, baseline: Option<f64>, set_at: Option<DateTime<Utc>>) {
    let seed = baseline
        .filter(|v| v.is_finite())
        .map(|b| (b, set_at))
        .or_else(|| {
            metric
                .current_value
                .filter(|v| v.is_finite())
                .map(|v| (v, metric.observed_at))
        });
    if let Some((value, at)) = seed {
        metric.baseline = Some(value);
        metric.baseline_set_at = Some(at.unwrap_or_else(Utc::now));
        debug!(metric_id = %metric.id, baseline = value, "Seeded baseline");
    }
}
