//! tscribe configuration loading and validation.
//!
//! This crate provides:
//! - Typed store configuration (file budgets, compression, key variable)
//! - Config resolution (explicit path → env → XDG → defaults)
//! - Semantic validation

pub mod resolve;
pub mod store;

pub use resolve::{resolve_config, ConfigPaths, ConfigSource, ResolvedConfig};
pub use store::{Compression, ConfigError, StoreConfig};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TSCRIBE_CONFIG";

/// Default environment variable carrying the encryption key.
pub const DEFAULT_KEY_ENV: &str = "TSCRIBE_ENCRYPTION_KEY";
