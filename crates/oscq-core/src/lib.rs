//! # OSCQuery Finder Core
//!
//! Shared building blocks for the OSCQuery finder sidecar and its embedded
//! library form:
//!
//! - **Configuration**: service type, instance prefix, resolve timeout and
//!   backoff, loaded from YAML files with `OSCQ_*` environment overrides.
//! - **Errors**: `thiserror` based error types for configuration failures.
//! - **Types**: the `ServiceAnnouncement` produced by a single resolver query.
//! - **Protocol**: the `FOUND:<port>` stdout line protocol spoken between the
//!   sidecar and its host application.
//! - **Logging**: tracing subscriber setup that never writes to stdout.
//!
//! ## Example
//!
//! ```
//! use oscq_core::config::FinderConfig;
//! use oscq_core::protocol;
//!
//! let config = FinderConfig::default();
//! assert!(config.validate().is_ok());
//!
//! assert_eq!(protocol::format_found(9000), "FOUND:9000");
//! assert_eq!(protocol::classify("FOUND:9000"), protocol::Line::Found(9000));
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod types;

pub use config::{DiscoveryConfig, FinderConfig, LogFormat, LoggingConfig};
pub use error::{ConfigError, FinderError, Result};
pub use types::ServiceAnnouncement;
