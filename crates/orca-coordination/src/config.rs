//! Connection configuration.
//!
//! An [`OrcaConfig`] names the store ensemble, the namespace root that
//! isolates this deployment's paths, and the bound on waiting for the store
//! to become ready. It deserializes with defaults or loads from the
//! environment:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `ORCA_URLS` | comma-separated `host:port` list | required |
//! | `ORCA_NAME` | namespace root | `orca` |
//! | `ORCA_TIMEOUT_MS` | connection readiness bound | `16000` |

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;

use crate::constants::DEFAULT_NAMESPACE;
use crate::constants::DEFAULT_TIMEOUT_MS;

/// Default values for configuration
mod defaults {
    pub fn name() -> String {
        super::DEFAULT_NAMESPACE.to_string()
    }

    pub fn timeout_ms() -> u64 {
        super::DEFAULT_TIMEOUT_MS
    }
}

/// Configuration error types
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is invalid
    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue { key: String, value: String, reason: String },

    /// A required configuration value is missing
    #[snafu(display("missing required configuration: {key} ({hint})"))]
    MissingRequired { key: String, hint: String },
}

/// Store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrcaConfig {
    /// Store ensemble members as `host:port`.
    pub urls: Vec<String>,
    /// Namespace root; every path lives under `/<name>`.
    #[serde(default = "defaults::name")]
    pub name: String,
    /// How long operations wait for the store to become ready (ms).
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,
}

impl OrcaConfig {
    /// Create a configuration with the default timeout.
    pub fn new<I, U>(urls: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            name: name.into(),
            timeout_ms: defaults::timeout_ms(),
        }
    }

    /// Override the connection readiness bound.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_urls = lookup("ORCA_URLS").ok_or_else(|| ConfigError::MissingRequired {
            key: "ORCA_URLS".to_string(),
            hint: "comma-separated list of host:port".to_string(),
        })?;
        let urls: Vec<String> =
            raw_urls.split(',').map(str::trim).filter(|url| !url.is_empty()).map(str::to_string).collect();

        let name = lookup("ORCA_NAME").unwrap_or_else(defaults::name);

        let timeout_ms = match lookup("ORCA_TIMEOUT_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "ORCA_TIMEOUT_MS".to_string(),
                value: raw.clone(),
                reason: format!("must be a whole number of milliseconds: {}", e),
            })?,
            None => defaults::timeout_ms(),
        };

        let config = Self { urls, name, timeout_ms };
        config.validate()?;
        Ok(config)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.urls.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "urls".to_string(),
                value: String::new(),
                reason: "at least one store url is required".to_string(),
            });
        }
        if self.name.is_empty() || self.name.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "name".to_string(),
                value: self.name.clone(),
                reason: "must be a single non-empty path segment".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Connection readiness bound.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Ensemble members joined by `,`, in the order given.
    pub fn connect_string(&self) -> String {
        self.urls.join(",")
    }
}
