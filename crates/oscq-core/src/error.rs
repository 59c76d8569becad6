//! Error types shared by the finder crates.

use thiserror::Error;

/// Result type alias using FinderError as the error type.
pub type Result<T> = std::result::Result<T, FinderError>;

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum FinderError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialised
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
