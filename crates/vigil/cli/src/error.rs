//! CLI error types

use thiserror::Error;
use vigil_health::HealthError;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine error
    #[error(transparent)]
    Health(#[from] HealthError),

    /// Invalid input file or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
