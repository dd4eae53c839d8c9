//! Configuration loader with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid worker batch_size: {0}. Must be at least 1")]
    InvalidBatchSize(u32),

    #[error("Invalid lock_lease_secs: {0}. Must be at least 1")]
    InvalidLockLease(u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. ./conflux.yaml
    /// 3. Environment variables (`CONFLUX_` prefix, `__` section separator)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("conflux.yaml"))
            .merge(Env::prefixed("CONFLUX_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CONFLUX_").split("__"))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.worker.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(config.worker.batch_size));
        }
        if config.worker.lock_lease_secs == 0 {
            return Err(ConfigError::InvalidLockLease(config.worker.lock_lease_secs));
        }

        if config.environment.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "environment cannot be empty".to_string(),
            ));
        }
        for rule in &config.csv_fields {
            if rule.field.is_empty() || rule.item_separator.is_empty() || rule.kv_separator.is_empty()
            {
                return Err(ConfigError::ValidationFailed(format!(
                    "csv field rule for {:?} must define field and separators",
                    rule.field
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ConfigLoader::validate(&Config::default()).is_ok());
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
