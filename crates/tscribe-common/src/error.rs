//! Error types for tscribe.

use thiserror::Error;

/// Result type alias for tscribe data-model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified data-model error type for tscribe.
#[derive(Error, Debug)]
pub enum Error {
    // Schema errors (20-29)
    #[error("metadata key '{key}' collides with a reserved column name; rename the key")]
    ReservedMetadataKey { key: String },

    #[error("transcript_id must be a non-empty string")]
    EmptyTranscriptId,

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::ReservedMetadataKey { .. } => 20,
            Error::EmptyTranscriptId => 21,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }
}
