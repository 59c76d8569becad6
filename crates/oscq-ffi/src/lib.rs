//! C ABI for hosting the OSCQuery port listener in-process
//!
//! Two entry points are exported:
//!
//! - `vrc_start_listener(callback)` starts discovery and calls `callback`
//!   with every new port; a running listener is superseded. A null callback
//!   is ignored.
//! - `vrc_stop_listener()` stops discovery. Safe to call at any time.
//!
//! The listener, its tokio runtime and the mDNS daemon are created on the
//! first start and live until the library is unloaded. Callbacks run on the
//! library's discovery thread.

pub mod embedded;

pub use embedded::EmbeddedListener;

use oscq_core::{logging, FinderConfig};
use oscq_discovery::{MdnsResolver, PortCallback};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, warn};

/// Process-wide listener, created on first start
static LISTENER: Mutex<Option<EmbeddedListener<MdnsResolver>>> = Mutex::new(None);

/// Installs logging from the loaded configuration, or from the defaults when
/// loading failed, and reports the failure once logging is up.
fn prepare_config(loaded: oscq_core::Result<FinderConfig>) -> FinderConfig {
    let (config, failure) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (FinderConfig::default(), Some(e)),
    };
    logging::try_init(&config.logging);

    if let Some(e) = failure {
        warn!(error = %e, "Falling back to default configuration");
    }
    config
}

fn create_listener() -> oscq_discovery::Result<EmbeddedListener<MdnsResolver>> {
    let config = prepare_config(FinderConfig::load(None));
    EmbeddedListener::new(MdnsResolver::new()?, &config.discovery)
}

fn start(callback: PortCallback) {
    let mut slot = LISTENER.lock();

    if slot.is_none() {
        match create_listener() {
            Ok(listener) => *slot = Some(listener),
            Err(e) => {
                error!(error = %e, "Failed to create port listener");
                return;
            }
        }
    }

    if let Some(listener) = slot.as_ref() {
        listener.start(callback);
    }
}

fn stop() {
    if let Some(listener) = LISTENER.lock().as_ref() {
        listener.stop();
    }
}

/// Starts listening and reports every port change through `callback`.
///
/// A null `callback` returns immediately without touching a running listener.
#[no_mangle]
pub extern "C" fn vrc_start_listener(callback: Option<PortCallback>) {
    let Some(callback) = callback else {
        return;
    };

    if panic::catch_unwind(AssertUnwindSafe(|| start(callback))).is_err() {
        error!("Panic while starting port listener");
    }
}

/// Stops listening and forgets the registered callback.
#[no_mangle]
pub extern "C" fn vrc_stop_listener() {
    if panic::catch_unwind(stop).is_err() {
        error!("Panic while stopping port listener");
    }
}
