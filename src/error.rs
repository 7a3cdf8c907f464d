//! Error types for the vitriol experiment driver

use thiserror::Error;

/// Result type alias for vitriol operations
pub type Result<T> = std::result::Result<T, VitriolError>;

/// Main error type for the experiment driver.
///
/// `MissingArtifact` and `CorruptArtifact` are soft-abort conditions: the
/// binary reports them with a user-facing message and exits cleanly instead
/// of surfacing a failure trace. Everything else is fatal to the run.
#[derive(Error, Debug)]
pub enum VitriolError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },
}

impl From<polars::error::PolarsError> for VitriolError {
    fn from(err: polars::error::PolarsError) -> Self {
        VitriolError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for VitriolError {
    fn from(err: serde_json::Error) -> Self {
        VitriolError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for VitriolError {
    fn from(err: ndarray::ShapeError) -> Self {
        VitriolError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl VitriolError {
    /// Whether this error should be reported as a clean abort rather than a
    /// failure (absent pretrained model, absent saved weights, absent cache).
    pub fn is_soft_abort(&self) -> bool {
        matches!(
            self,
            VitriolError::MissingArtifact(_) | VitriolError::CorruptArtifact(_)
        )
    }
}
