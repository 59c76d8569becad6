//! # listen-for-vrc
//!
//! Sidecar that follows the OSCQuery port of the local VRChat client.
//!
//! The process browses mDNS for `_oscjson._tcp.local.` instances named
//! `VRChat-Client-*` and prints `FOUND:<port>` to stdout every time the
//! advertised port changes. Logs go to stderr. With `--pid=<N>` the sidecar
//! refuses to start when process N is not running and exits as soon as it
//! terminates.

pub mod app;
pub mod cli;

pub use app::{run, Sidecar};
pub use cli::Cli;
