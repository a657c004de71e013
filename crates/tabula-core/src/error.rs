//! Error types for Tabula

use thiserror::Error;

/// Core error type for Tabula operations.
///
/// The first four variants form the taxonomy surfaced to API callers;
/// the rest cover internal plumbing. None of these are retried
/// automatically.
#[derive(Error, Debug)]
pub enum TabulaError {
    /// Unknown table/column or malformed request field. The message
    /// names the offending field.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database file or table absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Statistics requested on a nonexistent column.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Underlying query engine failure (malformed regex, type mismatch
    /// in a predicate, ...). Carries the engine's message.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Tabula operations
pub type Result<T> = std::result::Result<T, TabulaError>;
