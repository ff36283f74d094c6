//! Config file resolution.
//!
//! Order: explicit path → `TSCRIBE_CONFIG` → `<config_dir>/tscribe/config.toml`
//! → built-in defaults. An explicit or env-named file that is missing is an
//! error; a missing XDG file is not.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::store::{ConfigError, StoreConfig};
use crate::CONFIG_PATH_ENV;

const CONFIG_DIR_NAME: &str = "tscribe";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Env(PathBuf),
    UserConfig(PathBuf),
    Defaults,
}

/// Candidate config locations.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub explicit: Option<PathBuf>,
    pub env: Option<PathBuf>,
    pub user: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover candidates from the process environment.
    pub fn discover(explicit: Option<&Path>) -> Self {
        Self {
            explicit: explicit.map(Path::to_path_buf),
            env: std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from),
            user: dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)),
        }
    }
}

/// A loaded configuration with its provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: StoreConfig,
    pub source: ConfigSource,
}

/// Resolve configuration from the given candidate paths.
pub fn resolve_config(paths: &ConfigPaths) -> Result<ResolvedConfig, ConfigError> {
    if let Some(path) = &paths.explicit {
        debug!(path = %path.display(), "loading explicit config");
        return Ok(ResolvedConfig {
            config: StoreConfig::load_from_file(path)?,
            source: ConfigSource::Explicit(path.clone()),
        });
    }

    if let Some(path) = &paths.env {
        debug!(path = %path.display(), "loading config from {}", CONFIG_PATH_ENV);
        return Ok(ResolvedConfig {
            config: StoreConfig::load_from_file(path)?,
            source: ConfigSource::Env(path.clone()),
        });
    }

    if let Some(path) = paths.user.as_ref().filter(|p| p.is_file()) {
        debug!(path = %path.display(), "loading user config");
        return Ok(ResolvedConfig {
            config: StoreConfig::load_from_file(path)?,
            source: ConfigSource::UserConfig(path.clone()),
        });
    }

    Ok(ResolvedConfig {
        config: StoreConfig::default(),
        source: ConfigSource::Defaults,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_nothing_present() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths {
            explicit: None,
            env: None,
            user: Some(temp.path().join("missing.toml")),
        };
        let resolved = resolve_config(&paths).unwrap();
        assert_eq!(resolved.source, ConfigSource::Defaults);
        assert_eq!(resolved.config, StoreConfig::default());
    }

    #[test]
    fn test_explicit_wins_over_user() {
        let temp = TempDir::new().unwrap();
        let explicit = temp.path().join("explicit.toml");
        let user = temp.path().join("user.toml");
        std::fs::write(&explicit, "target_file_mb = 7\n").unwrap();
        std::fs::write(&user, "target_file_mb = 9\n").unwrap();

        let paths = ConfigPaths {
            explicit: Some(explicit.clone()),
            env: None,
            user: Some(user),
        };
        let resolved = resolve_config(&paths).unwrap();
        assert_eq!(resolved.config.target_file_mb, 7);
        assert_eq!(resolved.source, ConfigSource::Explicit(explicit));
    }

    #[test]
    fn test_missing_explicit_is_error() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths {
            explicit: Some(temp.path().join("nope.toml")),
            ..Default::default()
        };
        assert!(matches!(
            resolve_config(&paths),
            Err(ConfigError::Io { .. })
        ));
    }
}
