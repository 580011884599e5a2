//! Error types for the document intake pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using the intake Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for intake operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found (unknown id, deleted file, missing disk object)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upload rejected (disallowed MIME type, oversize, missing field)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Apply requested for a file without any completed extraction run
    #[error("No completed extraction for file {0}")]
    NoCompletedExtraction(Uuid),

    /// Parser or AI extraction service failure
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Admission limit reached, caller should retry later
    #[error("Overloaded: {0}")]
    Overloaded(String),

    /// State transition not allowed (e.g. second terminal write on a run)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
