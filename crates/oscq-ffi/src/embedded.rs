//! Port listener bundled with the runtime it runs on

use oscq_discovery::{CallbackSink, DiscoveryConfig, PortCallback, PortListener, Resolver, Result};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

/// A [`PortListener`] that owns its tokio runtime, for callers that have none.
pub struct EmbeddedListener<R: Resolver + 'static> {
    listener: PortListener<R>,
    /// Taken on drop
    runtime: Option<Runtime>,
}

impl<R: Resolver + 'static> EmbeddedListener<R> {
    /// Builds a one-worker runtime and a listener on top of it.
    pub fn new(resolver: R, config: &DiscoveryConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("oscq-discovery")
            .enable_all()
            .build()?;

        let listener = PortListener::with_runtime(resolver, config, runtime.handle().clone())?;

        Ok(Self {
            listener,
            runtime: Some(runtime),
        })
    }

    /// Starts (or restarts) discovery, reporting changes to `callback`.
    pub fn start(&self, callback: PortCallback) {
        self.listener
            .start(Some(Arc::new(CallbackSink::new(callback))));
    }

    pub fn stop(&self) {
        self.listener.stop();
    }

    pub fn is_running(&self) -> bool {
        self.listener.is_running()
    }

    pub fn current_port(&self) -> Option<u16> {
        self.listener.current_port()
    }
}

impl<R: Resolver + 'static> Drop for EmbeddedListener<R> {
    fn drop(&mut self) {
        self.listener.stop();
        // Dropping a runtime blocks on its tasks; an in-flight browse must not
        // hold up the caller.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
