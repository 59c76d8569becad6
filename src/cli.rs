//! Command line of the `listen-for-vrc` sidecar

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use oscq_core::{FinderConfig, LogFormat};
use std::path::PathBuf;

/// Finds the local VRChat OSCQuery service and prints FOUND:<port> on every change
#[derive(Parser, Debug, Default)]
#[command(name = "listen-for-vrc", author, version, about, long_about = None)]
pub struct Cli {
    /// Pid of the host process; the sidecar exits as soon as it does
    #[arg(long)]
    pub pid: Option<u32>,

    /// Path to a YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the mDNS service type
    #[arg(long)]
    pub service_type: Option<String>,

    /// Override the instance name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Override the per-query resolve timeout in milliseconds
    #[arg(long)]
    pub resolve_timeout_ms: Option<u64>,

    /// Override the pause between queries in milliseconds
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override the log format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Loads the configuration file and environment, applies the flags on
    /// top and validates the result.
    pub fn load_config(&self) -> Result<FinderConfig> {
        let mut config = FinderConfig::load(self.config.as_deref()).with_context(|| match &self.config {
            Some(path) => format!("Failed to load config file: {:?}", path),
            None => "Failed to load configuration".to_string(),
        })?;

        self.apply_overrides(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut FinderConfig) {
        if let Some(service_type) = &self.service_type {
            config.discovery.service_type = service_type.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.discovery.instance_prefix = prefix.clone();
        }
        if let Some(timeout) = self.resolve_timeout_ms {
            config.discovery.resolve_timeout_ms = timeout;
        }
        if let Some(backoff) = self.backoff_ms {
            config.discovery.backoff_ms = backoff;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }
    }
}
