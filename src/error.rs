//! Error types for the selection and ensembling pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure raised by a trainable model backend while fitting one configuration.
///
/// Inside the search these are absorbed and scored as 0; during retraining
/// they are fatal because they would shrink the ensemble.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingFailure {
    #[error("training diverged after {epoch} epochs (non-finite parameters)")]
    Diverged { epoch: usize },

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Training failure: {0}")]
    Training(#[from] TrainingFailure),

    #[error("Degenerate search: {found} distinct configurations evaluated, {required} required")]
    DegenerateSearch { required: usize, found: usize },

    #[error("Missing deployment model: {0}")]
    MissingDeploymentModel(String),

    #[error("Lifecycle violation: {0}")]
    Lifecycle(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
