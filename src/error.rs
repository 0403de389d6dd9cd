//! Error types for the ensembra toolkit

use thiserror::Error;

/// Result type alias for ensembra operations
pub type Result<T> = std::result::Result<T, EnsembraError>;

/// Main error type for the toolkit
#[derive(Error, Debug)]
pub enum EnsembraError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for EnsembraError {
    fn from(err: serde_json::Error) -> Self {
        EnsembraError::SerializationError(err.to_string())
    }
}
