//! Error types for query compilation.

use thiserror::Error;

/// Errors raised while compiling filters, orderings, or cursors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("invalid column path '{path}': {reason}")]
    InvalidColumnPath { path: String, reason: String },

    #[error("operator {operator} {reason}")]
    InvalidValue { operator: String, reason: String },

    #[error("{operator} requires a right-hand condition")]
    MissingOperand { operator: String },

    #[error("unknown SQL dialect '{0}' (expected sqlite, duckdb, or postgres)")]
    UnknownDialect(String),

    #[error("invalid sort order '{0}' (expected column or column:asc|desc)")]
    InvalidSort(String),

    #[error("cannot order by nested path '{0}'; order by a top-level column")]
    UnsupportedOrderColumn(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("page limit must be at least 1")]
    ZeroLimit,
}

/// Result type alias for query compilation.
pub type Result<T> = std::result::Result<T, QueryError>;
