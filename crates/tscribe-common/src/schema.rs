//! Schema versioning and reserved column names.

/// Current schema version written into every data and index file.
///
/// Follows semver: MAJOR.MINOR.PATCH
/// - MAJOR: Breaking changes (column removals, type changes)
/// - MINOR: Additive changes (new optional columns)
/// - PATCH: Bug fixes, documentation
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Key under which the schema version is stored in Parquet key/value metadata.
pub const SCHEMA_VERSION_KEY: &str = "tscribe.schema_version";

/// Unique key column shared by data files and index files.
pub const TRANSCRIPT_ID: &str = "transcript_id";

/// Index column holding the data file path relative to the location root.
pub const FILENAME: &str = "filename";

/// Content columns. Present only in data files, never in index files.
pub const CONTENT_COLUMNS: [&str; 2] = ["messages", "events"];

/// Column names owned by the storage layout. Metadata keys must not reuse them.
pub const RESERVED_COLUMNS: [&str; 15] = [
    "transcript_id",
    "filename",
    "source_type",
    "source_id",
    "source_uri",
    "model",
    "score",
    "success",
    "total_tokens",
    "total_time",
    "error",
    "limit",
    "metadata",
    "messages",
    "events",
];

/// Whether `name` is one of the reserved layout columns.
///
/// Comparison ignores ASCII case: the query engine resolves column names
/// case-insensitively, so `Model` would land on `model`.
pub fn is_reserved_column(name: &str) -> bool {
    RESERVED_COLUMNS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Check if a schema version is compatible with current.
///
/// Files written under a different MAJOR version are rejected on read.
pub fn is_compatible(version: &str) -> bool {
    let current_major = SCHEMA_VERSION
        .split('.')
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    let other_major = version
        .split('.')
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    current_major == other_major
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_major_compatible() {
        assert!(is_compatible("1.0.0"));
        assert!(is_compatible("1.4.2"));
    }

    #[test]
    fn test_different_major_incompatible() {
        assert!(!is_compatible("0.9.0"));
        assert!(!is_compatible("2.0.0"));
    }

    #[test]
    fn test_reserved_columns() {
        assert!(is_reserved_column("transcript_id"));
        assert!(is_reserved_column("limit"));
        assert!(!is_reserved_column("task"));
        assert!(is_reserved_column("Model"));
        assert!(is_reserved_column("TRANSCRIPT_ID"));
        for content in CONTENT_COLUMNS {
            assert!(is_reserved_column(content));
        }
    }
}
