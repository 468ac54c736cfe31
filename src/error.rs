//! Error types for the adoption functions service.

use thiserror::Error;

/// Main error type for service setup and hosting.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors raised by the data collaborators behind the function handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A uniqueness constraint was violated
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// The backend could not serve the request
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Faults surfaced by a function handler.
///
/// Expected outcomes (validation failures, auth rejections, throttling) are
/// returned as regular responses; this type only carries unexpected faults.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A data collaborator failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The response body could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other handler fault
    #[error("{0}")]
    Internal(String),
}
