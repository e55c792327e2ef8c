//! `rideshare.toml` loading, environment overrides, and validation.

use std::path::{Path, PathBuf};

use rideshare_domain::{FeePolicy, IncentiveConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// File read when `--config` is not given and it exists in the working directory.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "rideshare.toml";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Backend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerConfig {
    pub(crate) port: u16,
    /// Requests per minute per client IP.
    pub(crate) rate_limit: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            rate_limit: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct StorageConfig {
    pub(crate) backend: Backend,
    pub(crate) path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            path: PathBuf::from("rideshare.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub(crate) server: ServerConfig,
    pub(crate) storage: StorageConfig,
    pub(crate) incentive: IncentiveConfig,
    pub(crate) fees: FeePolicy,
}

impl Config {
    /// Read `path`, or `rideshare.toml` when present, or fall back to
    /// defaults; then apply `RIDESHARE_*` overrides and validate.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `RIDESHARE_DB` also selects the SQLite backend.
    pub(crate) fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("RIDESHARE_PORT") {
            self.server.port = value.parse().map_err(|_| ConfigError::Env {
                var: "RIDESHARE_PORT",
                value,
            })?;
        }
        if let Some(value) = lookup("RIDESHARE_RATE_LIMIT") {
            self.server.rate_limit = value.parse().map_err(|_| ConfigError::Env {
                var: "RIDESHARE_RATE_LIMIT",
                value,
            })?;
        }
        if let Some(value) = lookup("RIDESHARE_DB").filter(|v| !v.is_empty()) {
            self.storage.backend = Backend::Sqlite;
            self.storage.path = PathBuf::from(value);
        }
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.server.rate_limit == 0 {
            return Err(ConfigError::Invalid(
                "server.rate_limit must be at least 1".to_string(),
            ));
        }
        let incentive = &self.incentive;
        if incentive.split_pct > 100 {
            return Err(ConfigError::Invalid(format!(
                "incentive.split_pct must be within 0..=100, got {}",
                incentive.split_pct
            )));
        }
        if incentive.bonus_rate.is_sign_negative() {
            return Err(ConfigError::Invalid(format!(
                "incentive.bonus_rate must not be negative, got {}",
                incentive.bonus_rate
            )));
        }
        if incentive.experiment_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "incentive.experiment_key must not be empty".to_string(),
            ));
        }
        let rate = self.fees.platform_fee_rate;
        if rate.is_sign_negative() || rate >= Decimal::ONE {
            return Err(ConfigError::Invalid(format!(
                "fees.platform_fee_rate must be within [0, 1), got {rate}"
            )));
        }
        Ok(())
    }
}
