//! mDNS discovery of the VRChat OSCQuery service
//!
//! This crate keeps track of the port the local VRChat client advertises for
//! OSCQuery (`_oscjson._tcp.local.`) and tells a host about every change:
//! - [`ResolverAdapter`] runs one bounded query and picks the first instance
//!   whose name starts with the configured prefix
//! - [`DiscoveryLoop`] alternates between querying and a cancellable backoff,
//!   suppressing repeated and zero ports
//! - [`PortSink`] implementations deliver a change either as a `FOUND:<port>`
//!   stdout line or through a registered callback
//! - [`PortListener`] is the start/stop control surface; at most one loop runs
//!   per listener and a second start supersedes the first
//! - [`SidecarClient`] is the host side: it launches the sidecar binary and
//!   turns its stdout back into ports
//!
//! # Example
//!
//! ```no_run
//! use oscq_discovery::{DiscoveryConfig, MdnsResolver, PortListener, StdoutSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DiscoveryConfig::default();
//!     let listener = PortListener::new(MdnsResolver::new()?, &config)?;
//!
//!     // Prints FOUND:<port> whenever the advertised port changes
//!     listener.start(Some(Arc::new(StdoutSink::stdout())));
//!
//!     tokio::signal::ctrl_c().await?;
//!     listener.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod listener;
pub mod mdns;
pub mod resolver;
pub mod sink;

pub use config::DiscoveryConfig;
pub use controller::PortListener;
pub use error::{DiscoveryError, Result};
pub use host::SidecarClient;
pub use listener::{DiscoveryLoop, LoopState};
pub use mdns::MdnsResolver;
pub use resolver::{Lookup, Query, Resolver, ResolverAdapter};
pub use sink::{CallbackSink, ChannelSink, LineSink, PortCallback, PortSink, StdoutSink};
