//! Configuration management for the OSCQuery finder.
//!
//! Settings come from three layers, later layers winning:
//! - Built-in defaults
//! - An optional YAML file
//! - Environment variables prefixed with `OSCQ_` (nested keys joined by `__`,
//!   e.g. `OSCQ_DISCOVERY__BACKOFF_MS=250`)
//!
//! Command-line flags are applied on top by the binary.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "OSCQ";

/// DNS-SD service type advertised by OSCQuery hosts.
pub const DEFAULT_SERVICE_TYPE: &str = "_oscjson._tcp.local.";

/// Instance name prefix of the VRChat client's OSCQuery service.
pub const DEFAULT_INSTANCE_PREFIX: &str = "VRChat-Client";

/// Root configuration.
///
/// # Examples
///
/// ```
/// use oscq_core::config::FinderConfig;
///
/// let config = FinderConfig::from_yaml("discovery:\n  backoff_ms: 500\n").unwrap();
/// assert_eq!(config.discovery.backoff_ms, 500);
/// assert_eq!(config.discovery.instance_prefix, "VRChat-Client");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinderConfig {
    /// Discovery loop settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FinderConfig {
    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration with the `config` crate: defaults, then the
    /// optional file, then `OSCQ_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the merged result does
    /// not deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`FinderConfig::load`] but reads overrides from `env` instead
    /// of the process environment when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let origin = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<defaults>".to_string());
        let load_failed = |e: config::ConfigError| ConfigError::LoadFailed {
            path: origin.clone(),
            reason: e.to_string(),
        };

        let defaults = config::Config::try_from(&FinderConfig::default()).map_err(load_failed)?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(load_failed)?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.discovery.validate()?;
        self.logging.parse_level()?;
        Ok(())
    }
}

/// Settings for the resolver and the discovery loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Fully qualified DNS-SD service type to query
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Instance names must start with this prefix to be accepted
    #[serde(default = "default_instance_prefix")]
    pub instance_prefix: String,

    /// Upper bound for a single resolver query (milliseconds)
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,

    /// Pause between two resolver queries (milliseconds)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            instance_prefix: default_instance_prefix(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl DiscoveryConfig {
    /// Returns the resolve timeout as a Duration
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// Returns the backoff interval as a Duration
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Validates the discovery settings
    pub fn validate(&self) -> Result<()> {
        if self.service_type.trim().is_empty() {
            return Err(ConfigError::invalid("discovery.service_type", "cannot be empty").into());
        }

        if !self.service_type.ends_with(".local.") {
            return Err(ConfigError::invalid(
                "discovery.service_type",
                format!("'{}' must end with '.local.'", self.service_type),
            )
            .into());
        }

        if self.instance_prefix.is_empty() {
            return Err(ConfigError::invalid("discovery.instance_prefix", "cannot be empty").into());
        }

        if self.resolve_timeout_ms == 0 {
            return Err(ConfigError::invalid("discovery.resolve_timeout_ms", "cannot be 0").into());
        }

        if self.backoff_ms == 0 {
            return Err(ConfigError::invalid("discovery.backoff_ms", "cannot be 0").into());
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::invalid("logging.level", format!("Invalid log level: {}", self.level))
                .into()
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

fn default_instance_prefix() -> String {
    DEFAULT_INSTANCE_PREFIX.to_string()
}

fn default_resolve_timeout_ms() -> u64 {
    2000
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}
