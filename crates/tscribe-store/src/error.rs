//! Error types for storage operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing a storage location.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Parquet encode/decode error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow array or schema error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Query engine error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Encryption error
    #[error(transparent)]
    Crypt(#[from] tscribe_crypt::CryptError),

    /// Filter or pagination error
    #[error(transparent)]
    Query(#[from] tscribe_query::QueryError),

    /// Data-model validation error
    #[error(transparent)]
    Model(#[from] tscribe_common::Error),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] tscribe_config::ConfigError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A column has a type the layout does not allow
    #[error("column '{column}' in {path} has type {actual}, expected {expected}")]
    ColumnType {
        path: PathBuf,
        column: String,
        expected: String,
        actual: String,
    },

    /// A file was written under an incompatible major schema version
    #[error("{path} was written with schema version {version}, which this build cannot read")]
    IncompatibleSchema { path: PathBuf, version: String },

    /// A migration target could not be rewritten
    #[error("cannot migrate '{target}': {message}")]
    Migration { target: String, message: String },

    /// An index row points at a data file that does not exist
    #[error("index references missing data file '{filename}'")]
    MissingDataFile { filename: String },

    /// I/O error
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Stable numeric code, aligned with the shared taxonomy.
    pub fn code(&self) -> u32 {
        match self {
            StoreError::Config(_) => 10,
            StoreError::Crypt(e) => e.code(),
            StoreError::Model(e) => e.code(),
            StoreError::ColumnType { .. } => 23,
            StoreError::Migration { .. } => 24,
            StoreError::IncompatibleSchema { .. } => 25,
            StoreError::MissingDataFile { .. } => 31,
            StoreError::Parquet(_) => 32,
            StoreError::Arrow(_) => 33,
            StoreError::Sqlite(_) => 34,
            StoreError::Query(_) => 40,
            StoreError::Io { .. } => 60,
            StoreError::Json(_) => 61,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
