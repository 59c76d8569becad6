//! Start/stop control surface for the discovery loop

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::listener::{DiscoveryLoop, DiscoveryState};
use crate::resolver::{Resolver, ResolverAdapter};
use crate::sink::PortSink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Owns the discovery state and runs at most one discovery loop at a time.
///
/// `start` and `stop` are idempotent, callable from any thread and only hold
/// the state lock briefly; neither waits for the loop to wind down.
pub struct PortListener<R: Resolver + 'static> {
    /// Resolver adapter shared with every loop this listener spawns
    adapter: Arc<ResolverAdapter<R>>,

    /// Pause between two queries
    backoff: Duration,

    /// Control lock over the discovery state
    state: Arc<Mutex<DiscoveryState>>,

    /// Runtime the loops are spawned on
    runtime: Handle,
}

impl<R: Resolver + 'static> PortListener<R> {
    /// Creates a listener spawning its loops on the current tokio runtime.
    pub fn new(resolver: R, config: &DiscoveryConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| DiscoveryError::NoRuntime(e.to_string()))?;
        Self::with_runtime(resolver, config, runtime)
    }

    /// Creates a listener spawning its loops on `runtime`.
    pub fn with_runtime(resolver: R, config: &DiscoveryConfig, runtime: Handle) -> Result<Self> {
        config.validate()?;

        info!(
            service_type = %config.service_type,
            prefix = %config.instance_prefix,
            "Port listener created"
        );

        Ok(Self {
            adapter: Arc::new(ResolverAdapter::new(resolver, config)),
            backoff: config.backoff(),
            state: DiscoveryState::shared(),
            runtime,
        })
    }

    /// Starts discovery, superseding any loop that is already running.
    ///
    /// The previous loop is cancelled and its registration dropped before the
    /// new one is installed. With `None` the loop still runs but changes are
    /// delivered nowhere.
    pub fn start(&self, sink: Option<Arc<dyn PortSink>>) {
        let mut state = self.state.lock();

        if state.is_active() {
            debug!("Superseding running discovery loop");
        }
        state.retire();
        state.sink = sink;

        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());

        let discovery = DiscoveryLoop::new(
            self.adapter.clone(),
            self.state.clone(),
            self.backoff,
            cancel,
        );
        state.task = Some(self.runtime.spawn(discovery.run()));

        info!("Discovery started");
    }

    /// Stops discovery and clears the registration. No-op when idle.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.cancel.is_none() && state.sink.is_none() {
            return;
        }

        state.retire();
        info!("Discovery stopped");
    }

    /// Returns whether a loop is active
    pub fn is_running(&self) -> bool {
        self.state.lock().is_active()
    }

    /// Last announced port, if any
    pub fn current_port(&self) -> Option<u16> {
        match self.state.lock().current_port {
            0 => None,
            port => Some(port),
        }
    }
}

impl<R: Resolver + 'static> Drop for PortListener<R> {
    fn drop(&mut self) {
        self.state.lock().retire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Query;

    struct NeverResolver;

    #[async_trait::async_trait]
    impl Resolver for NeverResolver {
        async fn query(
            &self,
            _query: &Query<'_>,
            _cancel: &CancellationToken,
        ) -> Result<Vec<oscq_core::ServiceAnnouncement>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_requires_runtime() {
        let result = PortListener::new(NeverResolver, &DiscoveryConfig::default());
        assert!(matches!(result, Err(DiscoveryError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let config = DiscoveryConfig {
            backoff_ms: 0,
            ..Default::default()
        };
        let result = PortListener::new(NeverResolver, &config);
        assert!(matches!(result, Err(DiscoveryError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let listener = PortListener::new(NeverResolver, &DiscoveryConfig::default()).unwrap();
        assert!(!listener.is_running());

        listener.stop();
        assert!(!listener.is_running());

        listener.start(None);
        assert!(listener.is_running());

        listener.stop();
        listener.stop();
        assert!(!listener.is_running());
        assert_eq!(listener.current_port(), None);
    }
}
