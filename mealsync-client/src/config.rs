//! Configuration loading for the synchronized client.
//!
//! Only `api_base_url` is required. Timing policy lives in an optional
//! `[sync]` table and falls back to the defaults from `mealsync-core`.
//!
//! ```toml
//! api_base_url = "http://localhost:3000"
//! request_timeout_ms = 10000
//! mirror_path = "/var/lib/mealsync/mirror"
//!
//! [sync]
//! debounce_ms = 1000
//! critical_keys = ["pantry"]
//! ```

use std::path::{Path, PathBuf};

use mealsync_core::SyncConfig;
use serde::Deserialize;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "MEALSYNC_CLIENT_CONFIG";

const DEFAULT_MIRROR_MAX_SIZE_MB: usize = 64;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Per-request timeout. Unset means no timeout.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Directory of the LMDB mirror. Unset keeps the mirror in memory.
    #[serde(default)]
    pub mirror_path: Option<PathBuf>,
    #[serde(default = "default_mirror_max_size_mb")]
    pub mirror_max_size_mb: usize,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_mirror_max_size_mb() -> usize {
    DEFAULT_MIRROR_MAX_SIZE_MB
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or MEALSYNC_CLIENT_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    /// Config with defaults for everything but the proxy URL.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout_ms: None,
            mirror_path: None,
            mirror_max_size_mb: DEFAULT_MIRROR_MAX_SIZE_MB,
            sync: SyncConfig::default(),
        }
    }

    /// Locate (`--config`, then `MEALSYNC_CLIENT_CONFIG`), parse and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0 when set".to_string(),
            });
        }
        if self.mirror_max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "mirror_max_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(path) = &self.mirror_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "mirror_path",
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        self.sync.validate().map_err(|e| ConfigError::InvalidValue {
            field: "sync",
            reason: e.to_string(),
        })
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ClientConfig::from_toml_str(r#"api_base_url = "http://localhost:3000""#).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout_ms, None);
        assert_eq!(config.mirror_max_size_mb, 64);
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_sync_table_overrides() {
        let config = ClientConfig::from_toml_str(
            r#"
            api_base_url = "https://meals.example.com"
            request_timeout_ms = 2500

            [sync]
            debounce_ms = 250
            critical_keys = ["pantry", "shoppingList"]
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.debounce_window, Duration::from_millis(250));
        assert_eq!(config.sync.critical_keys.len(), 2);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = ClientConfig::from_toml_str(
            r#"
            api_base_url = "http://localhost:3000"
            retry = 5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ClientConfig::new("localhost:3000");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "api_base_url", .. })
        ));

        config.api_base_url = "http://localhost:3000".to_string();
        config.request_timeout_ms = Some(0);
        assert!(config.validate().is_err());

        config.request_timeout_ms = None;
        config.sync.retry_delay = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "sync", .. })
        ));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"api_base_url = "http://127.0.0.1:8080""#).unwrap();
        writeln!(file, r#"mirror_path = "/tmp/mealsync-mirror""#).unwrap();

        let config = ClientConfig::from_path(file.path()).unwrap();
        assert_eq!(
            config.mirror_path.as_deref(),
            Some(Path::new("/tmp/mealsync-mirror"))
        );
    }

    #[test]
    fn test_invalid_critical_key_fails_to_parse() {
        let result = ClientConfig::from_toml_str(
            r#"
            api_base_url = "http://localhost:3000"
            [sync]
            critical_keys = ["../pantry"]
            "#,
        );
        assert!(result.is_err());
    }
}
