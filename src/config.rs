// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery service configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Discovery service configuration, loaded from the environment and optionally
/// overridden by a JSON file passed via `--config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment name (informational only).
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Reported by health and JWKS.
    #[serde(default = "default_service_version")]
    pub service_version: String,

    /// TTL applied to all registrations, in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,

    /// Period of the per-partition cleanup alarm, in milliseconds.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Log verbosity.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Base directory for per-partition SQLite files and the metrics store.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// HTTP listen address for the gateway.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Current Ed25519 signing key, as `{id, privateKey}` JSON (base64 `privateKey`).
    /// Required only for `CreateBootstrapToken`; absence surfaces as `internal`
    /// at call time, not at startup.
    #[serde(default)]
    pub signing_key: Option<String>,

    /// Previous signing keys retained for JWKS publication during rotation.
    #[serde(default)]
    pub previous_keys: Option<String>,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_service_version() -> String {
    "0.0.0".to_string()
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_cleanup_interval_ms() -> u64 {
    60_000
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8787".to_string()
}

/// Log verbosity levels recognized by `LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Silent,
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "silent" => Ok(Self::Silent),
            other => Err(ConfigError::InvalidValue(format!(
                "unrecognized LOG_LEVEL: {other}"
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            service_version: default_service_version(),
            default_ttl_seconds: default_ttl_seconds(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            bind_addr: default_bind_addr(),
            signing_key: None,
            previous_keys: None,
        }
    }
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("ENVIRONMENT") {
            config.environment = v;
        }
        if let Ok(v) = std::env::var("SERVICE_VERSION") {
            config.service_version = v;
        }
        if let Ok(v) = std::env::var("DEFAULT_TTL_SECONDS") {
            config.default_ttl_seconds = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("DEFAULT_TTL_SECONDS: {v}")))?;
        }
        if let Ok(v) = std::env::var("CLEANUP_INTERVAL_MS") {
            config.cleanup_interval_ms = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("CLEANUP_INTERVAL_MS: {v}")))?;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v.parse()?;
        }
        if let Ok(v) = std::env::var("DATA_DIR") {
            config.data_dir = v;
        }
        if let Ok(v) = std::env::var("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Ok(v) = std::env::var("DISCOVERY_SIGNING_KEY") {
            config.signing_key = Some(v);
        }
        if let Ok(v) = std::env::var("DISCOVERY_PREVIOUS_KEYS") {
            config.previous_keys = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file, layered on top of environment defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "default_ttl_seconds cannot be 0".into(),
            ));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "cleanup_interval_ms cannot be 0".into(),
            ));
        }
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue(format!("invalid bind_addr: {}", self.bind_addr)))?;
        Ok(())
    }

    pub fn default_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cleanup_interval_ms)
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {s}"),
            Self::ParseError(s) => write!(f, "parse error: {s}"),
            Self::InvalidValue(s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_ttl_seconds, 300);
        assert_eq!(config.cleanup_interval_ms, 60_000);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config.bind_addr, parsed.bind_addr);
    }

    #[test]
    fn test_validation_zero_ttl() {
        let config = Config {
            default_ttl_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_bind_addr() {
        let config = Config {
            bind_addr: "not-an-addr".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("SILENT".parse::<LogLevel>().unwrap(), LogLevel::Silent);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
