//! Error types for the shared data model.

use thiserror::Error;

/// Result type alias using the data model error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while interpreting persisted records.
#[derive(Debug, Error)]
pub enum Error {
    #[error("interval_seconds must be between {min} and {max}, got {value}")]
    InvalidInterval { value: i64, min: i64, max: i64 },

    #[error("invalid workflow data: {0}")]
    InvalidWorkflowData(#[from] serde_json::Error),
}
