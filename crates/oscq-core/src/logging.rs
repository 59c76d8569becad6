//! Tracing subscriber setup.
//!
//! Log output always goes to stderr: stdout belongs to the line protocol.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{FinderError, Result};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error if
/// a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level = config.parse_level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| FinderError::Logging(e.to_string()))
}

/// Like [`init`], but a subscriber that is already installed is not an error.
///
/// Used by the embedded library, which cannot know whether its host set one up.
pub fn try_init(config: &LoggingConfig) {
    let _ = init(config);
}
