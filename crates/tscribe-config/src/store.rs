//! Store configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::DEFAULT_KEY_ENV;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Column compression codec for data and index files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Zstd,
    Snappy,
    None,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::Zstd => write!(f, "zstd"),
            Compression::Snappy => write!(f, "snappy"),
            Compression::None => write!(f, "none"),
        }
    }
}

/// Tunables for a transcript store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub schema_version: String,

    /// Size budget for one data file, in megabytes.
    pub target_file_mb: u64,

    /// Size budget for one row group inside a data file, in megabytes.
    pub row_group_mb: u64,

    /// Maximum rows per row group in index files.
    pub index_row_group_rows: usize,

    /// Environment variable that supplies the encryption key.
    pub encryption_key_env: String,

    /// Number of data files whose column sets are cached.
    pub schema_cache_capacity: usize,

    pub compression: Compression,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            target_file_mb: 100,
            row_group_mb: 16,
            index_row_group_rows: 100_000,
            encryption_key_env: DEFAULT_KEY_ENV.to_string(),
            schema_cache_capacity: 256,
            compression: Compression::Zstd,
        }
    }
}

impl StoreConfig {
    /// Data-file budget in bytes.
    pub fn target_file_bytes(&self) -> u64 {
        self.target_file_mb * 1024 * 1024
    }

    /// Row-group budget in bytes.
    pub fn row_group_bytes(&self) -> u64 {
        self.row_group_mb * 1024 * 1024
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str, path: PathBuf) -> Result<Self, ConfigError> {
        let config: StoreConfig =
            toml::from_str(raw).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path.to_path_buf())
    }

    /// Semantic validation of budgets and names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_file_mb == 0 {
            return Err(ConfigError::Invalid {
                field: "target_file_mb",
                message: "must be at least 1".to_string(),
            });
        }
        if self.row_group_mb == 0 {
            return Err(ConfigError::Invalid {
                field: "row_group_mb",
                message: "must be at least 1".to_string(),
            });
        }
        if self.row_group_mb > self.target_file_mb {
            return Err(ConfigError::Invalid {
                field: "row_group_mb",
                message: format!(
                    "{} exceeds target_file_mb ({})",
                    self.row_group_mb, self.target_file_mb
                ),
            });
        }
        if self.index_row_group_rows == 0 {
            return Err(ConfigError::Invalid {
                field: "index_row_group_rows",
                message: "must be at least 1".to_string(),
            });
        }
        if self.encryption_key_env.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "encryption_key_env",
                message: "must name an environment variable".to_string(),
            });
        }
        if self.schema_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "schema_cache_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_file_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.encryption_key_env, "TSCRIBE_ENCRYPTION_KEY");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config =
            StoreConfig::from_toml_str("target_file_mb = 8\nrow_group_mb = 2\n", "x.toml".into())
                .unwrap();
        assert_eq!(config.target_file_mb, 8);
        assert_eq!(config.row_group_mb, 2);
        assert_eq!(config.compression, Compression::Zstd);
    }

    #[test]
    fn test_row_group_larger_than_file_rejected() {
        let err = StoreConfig::from_toml_str("target_file_mb = 4\nrow_group_mb = 8\n", "x".into())
            .unwrap_err();
        assert!(err.to_string().contains("row_group_mb"));
    }

    #[test]
    fn test_compression_parses() {
        let config = StoreConfig::from_toml_str("compression = \"snappy\"\n", "x".into()).unwrap();
        assert_eq!(config.compression, Compression::Snappy);
        assert!(StoreConfig::from_toml_str("compression = \"lz9\"\n", "x".into()).is_err());
    }
}
