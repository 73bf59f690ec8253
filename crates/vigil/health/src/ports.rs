//! Collaborator interfaces.
//!
//! The engine reads static metric configuration from a [`DefinitionRegistry`]
//! and raw values from an [`ObservationFeed`]. In-memory implementations are
//! provided for embedding and tests.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use vigil_types::{MetricDefinition, Observation};

use crate::error::{HealthError, HealthResult};

/// Source of metric definitions.
pub trait DefinitionRegistry: Send + Sync {
    fn definitions(&self) -> HealthResult<Vec<MetricDefinition>>;
}

/// Source of raw metric observations.
#[async_trait]
pub trait ObservationFeed: Send + Sync {
    /// Observations that arrived since the last poll.
    async fn poll(&self) -> HealthResult<Vec<Observation>>;
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "metric")]
    metrics: Vec<MetricDefinition>,
}

/// Fixed list of definitions.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    definitions: Vec<MetricDefinition>,
}

impl StaticRegistry {
    pub fn new(definitions: Vec<MetricDefinition>) -> Self {
        Self { definitions }
    }

    /// Parse `[[metric]]` tables.
    ///
    /// ```
    /// use vigil_health::{DefinitionRegistry, StaticRegistry};
    ///
    /// let registry = StaticRegistry::from_toml_str(r#"
    ///     [[metric]]
    ///     id = "error_rate"
    ///     category = "performance"
    ///     threshold = 0.05
    ///     polarity = "higher_is_worse"
    /// "#).unwrap();
    /// assert_eq!(registry.definitions().unwrap().len(), 1);
    /// ```
    pub fn from_toml_str(source: &str) -> HealthResult<Self> {
        let file: RegistryFile = toml::from_str(source)?;
        let registry = Self::new(file.metrics);
        registry.validate()?;
        Ok(registry)
    }

    pub fn load(path: impl AsRef<Path>) -> HealthResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            HealthError::InvalidConfiguration(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn with_definition(mut self, definition: MetricDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Reject malformed definitions and duplicate ids.
    pub fn validate(&self) -> HealthResult<()> {
        let mut seen = std::collections::HashSet::new();
        for definition in &self.definitions {
            definition.validate()?;
            if !seen.insert(&definition.id) {
                return Err(HealthError::InvalidConfiguration(format!(
                    "metric {} is defined more than once",
                    definition.id
                )));
            }
        }
        Ok(())
    }
}

impl DefinitionRegistry for StaticRegistry {
    fn definitions(&self) -> HealthResult<Vec<MetricDefinition>> {
        Ok(self.definitions.clone())
    }
}

/// In-memory queue drained on each poll.
#[derive(Debug, Default)]
pub struct QueueFeed {
    queue: Mutex<VecDeque<Observation>>,
}

impl QueueFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, observation: Observation) {
        self.queue.lock().push_back(observation);
    }

    pub fn extend(&self, observations: impl IntoIterator<Item = Observation>) {
        self.queue.lock().extend(observations);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl ObservationFeed for QueueFeed {
    async fn poll(&self) -> HealthResult<Vec<Observation>> {
        Ok(self.queue.lock().drain(..).collect())
    }
}
