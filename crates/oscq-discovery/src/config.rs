//! Configuration types for service discovery
//!
//! Re-exports configuration from oscq-core so the binary and the embedded
//! library share one definition

pub use oscq_core::config::{DiscoveryConfig, DEFAULT_INSTANCE_PREFIX, DEFAULT_SERVICE_TYPE};
