//! Error types for the discovery service

use thiserror::Error;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors that can occur during service discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// mDNS service daemon failed to initialize
    #[error("Failed to initialize mDNS daemon: {0}")]
    MdnsInitFailed(String),

    /// Failed to browse for services
    #[error("Failed to browse for service type '{service_type}': {reason}")]
    BrowseFailed { service_type: String, reason: String },

    /// The query was cancelled before it completed
    #[error("Discovery query cancelled")]
    Cancelled,

    /// Invalid discovery configuration
    #[error("Invalid discovery configuration: {0}")]
    InvalidConfig(String),

    /// No tokio runtime available to drive the discovery loop
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// The sidecar executable could not be launched
    #[error("Failed to launch sidecar '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<oscq_core::FinderError> for DiscoveryError {
    fn from(err: oscq_core::FinderError) -> Self {
        DiscoveryError::InvalidConfig(err.to_string())
    }
}
