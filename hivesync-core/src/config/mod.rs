//! Configuration management for HiveSync
//!
//! This module provides file- and environment-based configuration with
//! defaults and validation. Sections map one to one onto the components that
//! consume them: the overlay (`dht`), the data manager (`data`) and logging.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::core_data::DataConfig;
use crate::core_dht::DhtConfig;
use crate::logging::{LogConfig, LogLevel};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Overlay configuration
    #[serde(default)]
    pub dht: DhtConfig,

    /// Data manager configuration
    #[serde(default)]
    pub data: DataConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Convert into the logging subsystem's configuration
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level: LogLevel = self.level.parse().map_err(|e: crate::logging::LoggingError| {
            ConfigError::InvalidValue { key: "logging.level".to_string(), reason: e.to_string() }
        })?;
        Ok(LogConfig::new(level)
            .with_timestamp(self.with_timestamp)
            .with_target(self.with_target)
            .json_format(self.json_format))
    }
}

/// Parse an environment variable if it is set
fn env_value<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue { key: key.to_string(), reason: e.to_string() }),
        Err(_) => Ok(None),
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_value::<u64>(key)?.map(Duration::from_millis))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: HIVESYNC_<SECTION>_<KEY>
    /// Example: HIVESYNC_DHT_REPLICATION_FACTOR=5
    /// Durations are given in milliseconds (`_MS` suffix).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // DHT config
        if let Some(peers) = env_value("HIVESYNC_DHT_PEER_COUNT")? {
            config.dht.peer_count = peers;
        }
        if let Some(factor) = env_value("HIVESYNC_DHT_REPLICATION_FACTOR")? {
            config.dht.replication_factor = factor;
        }
        if let Some(size) = env_value("HIVESYNC_DHT_MAX_VALUE_SIZE")? {
            config.dht.max_value_size = size;
        }
        if let Some(latency) = env_millis("HIVESYNC_DHT_SIMULATED_LATENCY_MS")? {
            config.dht.simulated_latency = latency;
        }

        // Data config
        if let Some(timeout) = env_millis("HIVESYNC_DATA_OPERATION_TIMEOUT_MS")? {
            config.data.operation_timeout = timeout;
        }
        if let Some(acks) = env_value("HIVESYNC_DATA_REQUIRED_ACKS")? {
            config.data.required_acks = acks;
        }
        if let Some(validate) = env_value("HIVESYNC_DATA_VALIDATE_CHAINS")? {
            config.data.validate_chains = validate;
        }

        // Logging config
        if let Ok(level) = env::var("HIVESYNC_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = env_value("HIVESYNC_LOG_JSON")? {
            config.logging.json_format = json;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dht.validate().map_err(ConfigError::ValidationFailed)?;

        if self.data.required_acks == 0 {
            return Err(ConfigError::ValidationFailed(
                "required_acks must be greater than 0".to_string(),
            ));
        }
        if self.data.required_acks > self.dht.replication_factor {
            return Err(ConfigError::ValidationFailed(format!(
                "required_acks ({}) exceeds replication_factor ({})",
                self.data.required_acks, self.dht.replication_factor
            )));
        }
        if self.data.operation_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "operation_timeout must be greater than 0".to_string(),
            ));
        }

        self.logging.to_log_config()?;
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.dht.replication_factor = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.data.required_acks = config.dht.replication_factor + 1;
        assert!(config.validate().is_err());

        config = Config::default();
        config.data.operation_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.to_log_config().unwrap().level, LogLevel::Debug);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hivesync.toml");

        let mut config = Config::default();
        config.dht.peer_count = 7;
        config.data.operation_timeout = Duration::from_millis(1500);
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\njson_format = true\nwith_timestamp = false\nwith_target = false\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.logging.level, "warn");
        assert_eq!(loaded.dht, DhtConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/hivesync.toml");
        assert!(matches!(result, Err(ConfigError::FileReadError(_))));
    }
}
