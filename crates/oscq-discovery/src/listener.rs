//! The discovery loop: Querying -> Backoff -> Querying until cancelled

use crate::resolver::{Lookup, Resolver, ResolverAdapter};
use crate::sink::PortSink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Listener state guarded by the control lock.
///
/// Start, stop and every port update go through the same mutex.
#[derive(Default)]
pub struct DiscoveryState {
    /// Last notified port, 0 when none
    pub(crate) current_port: u16,
    /// Cancellation source of the active loop
    pub(crate) cancel: Option<CancellationToken>,
    /// Registered notification target
    pub(crate) sink: Option<Arc<dyn PortSink>>,
    /// Task running the active loop
    pub(crate) task: Option<JoinHandle<()>>,
}

impl DiscoveryState {
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Records an observed port. Returns true if it is a change that must be
    /// announced: nonzero and different from the current port.
    pub(crate) fn observe(&mut self, port: u16) -> bool {
        if port == 0 || port == self.current_port {
            return false;
        }
        self.current_port = port;
        true
    }

    /// Cancels the active loop and clears the registration.
    pub(crate) fn retire(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        // The task winds down on its own once it sees the cancellation.
        self.task.take();
        self.sink = None;
        self.current_port = 0;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|cancel| !cancel.is_cancelled())
    }
}

/// States of the discovery loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Issuing one bounded resolve
    Querying,
    /// Waiting out the backoff interval
    Backoff,
    /// Terminal, reached only through cancellation
    Stopped,
}

/// One discovery loop bound to one cancellation token.
pub struct DiscoveryLoop<R> {
    adapter: Arc<ResolverAdapter<R>>,
    state: Arc<Mutex<DiscoveryState>>,
    backoff: Duration,
    cancel: CancellationToken,
}

impl<R: Resolver> DiscoveryLoop<R> {
    pub fn new(
        adapter: Arc<ResolverAdapter<R>>,
        state: Arc<Mutex<DiscoveryState>>,
        backoff: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            state,
            backoff,
            cancel,
        }
    }

    /// Runs until the token is cancelled.
    pub async fn run(self) {
        debug!(
            service_type = self.adapter.service_type(),
            prefix = self.adapter.instance_prefix(),
            backoff_ms = self.backoff.as_millis() as u64,
            "Discovery loop started"
        );

        let mut state = LoopState::Querying;
        while state != LoopState::Stopped {
            state = self.step(state).await;
        }

        debug!("Discovery loop stopped");
    }

    /// Performs one transition of the state machine.
    pub async fn step(&self, state: LoopState) -> LoopState {
        match state {
            LoopState::Querying => self.query().await,
            LoopState::Backoff => self.wait_backoff().await,
            LoopState::Stopped => LoopState::Stopped,
        }
    }

    async fn query(&self) -> LoopState {
        match self.adapter.resolve(&self.cancel).await {
            Lookup::Cancelled => LoopState::Stopped,
            Lookup::NotFound => {
                trace!("No matching service this attempt");
                LoopState::Backoff
            }
            Lookup::Found(port) => {
                if self.publish(port) {
                    LoopState::Backoff
                } else {
                    LoopState::Stopped
                }
            }
        }
    }

    /// Applies an observed port. Returns false if this loop has been
    /// superseded, in which case nothing is updated or announced.
    fn publish(&self, port: u16) -> bool {
        let sink = {
            let mut state = self.state.lock();
            if self.cancel.is_cancelled() {
                return false;
            }
            if !state.observe(port) {
                trace!(port, "Port unchanged or zero, not announcing");
                return true;
            }
            state.sink.clone()
        };

        match sink {
            Some(sink) => self.deliver(sink.as_ref(), port),
            None => {
                debug!(port, "Service port changed, no sink registered");
                true
            }
        }
    }

    /// Hands a change to the sink unless this loop was stopped after the
    /// sink was read. A stop landing between this check and the call itself
    /// can still see one last notification.
    fn deliver(&self, sink: &dyn PortSink, port: u16) -> bool {
        if self.cancel.is_cancelled() {
            debug!(port, "Listener stopped before delivery, dropping change");
            return false;
        }

        info!(port, "Service port changed");
        sink.announce(port);
        true
    }

    async fn wait_backoff(&self) -> LoopState {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => LoopState::Stopped,
            _ = tokio::time::sleep(self.backoff) => LoopState::Querying,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::error::{DiscoveryError, Result};
    use crate::resolver::Query;
    use async_trait::async_trait;
    use oscq_core::ServiceAnnouncement;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays one scripted reply per query; an exhausted script hangs.
    struct ScriptedResolver {
        replies: Mutex<VecDeque<Option<Vec<ServiceAnnouncement>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedResolver {
        fn new(replies: Vec<Option<Vec<ServiceAnnouncement>>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Resolver for ScriptedResolver {
        async fn query(
            &self,
            _query: &Query<'_>,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ServiceAnnouncement>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.replies.lock().pop_front();
            match next {
                Some(Some(announcements)) => Ok(announcements),
                Some(None) => Err(DiscoveryError::BrowseFailed {
                    service_type: "_oscjson._tcp.local.".to_string(),
                    reason: "timeout".to_string(),
                }),
                None => std::future::pending().await,
            }
        }
    }

    fn reply(entries: &[(&str, u16)]) -> Option<Vec<ServiceAnnouncement>> {
        Some(
            entries
                .iter()
                .map(|(name, port)| ServiceAnnouncement::new(*name, *port, vec![]))
                .collect(),
        )
    }

    struct Harness {
        resolver: Arc<ScriptedResolver>,
        state: Arc<Mutex<DiscoveryState>>,
        notified: Arc<Mutex<Vec<u16>>>,
        cancel: CancellationToken,
        lp: DiscoveryLoop<Arc<ScriptedResolver>>,
    }

    fn harness(replies: Vec<Option<Vec<ServiceAnnouncement>>>) -> Harness {
        let resolver = Arc::new(ScriptedResolver::new(replies));
        let state = DiscoveryState::shared();
        let notified = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let recorder = notified.clone();
        let sink: Arc<dyn PortSink> = Arc::new(move |port: u16| recorder.lock().push(port));
        state.lock().sink = Some(sink);
        state.lock().cancel = Some(cancel.clone());

        let adapter = Arc::new(ResolverAdapter::new(
            resolver.clone(),
            &DiscoveryConfig::default(),
        ));
        let lp = DiscoveryLoop::new(adapter, state.clone(), Duration::from_secs(1), cancel.clone());

        Harness {
            resolver,
            state,
            notified,
            cancel,
            lp,
        }
    }

    #[test]
    fn test_observe_rules() {
        let mut state = DiscoveryState::default();
        assert!(!state.observe(0));
        assert!(state.observe(9000));
        assert!(!state.observe(9000));
        assert!(!state.observe(0));
        assert_eq!(state.current_port, 9000);
        assert!(state.observe(9001));
        assert_eq!(state.current_port, 9001);
    }

    #[tokio::test]
    async fn test_scenario_dedup_and_zero_port() {
        let h = harness(vec![
            reply(&[("Other-Client", 1), ("VRChat-Client-5", 9000)]),
            reply(&[("Other-Client", 1), ("VRChat-Client-5", 9000)]),
            reply(&[("VRChat-Client-5", 0)]),
        ]);

        for _ in 0..3 {
            assert_eq!(h.lp.step(LoopState::Querying).await, LoopState::Backoff);
        }

        assert_eq!(*h.notified.lock(), vec![9000]);
        assert_eq!(h.state.lock().current_port, 9000);
    }

    #[tokio::test]
    async fn test_failures_lead_to_backoff() {
        let h = harness(vec![None, reply(&[]), reply(&[("Other-Client", 1)])]);

        for _ in 0..3 {
            assert_eq!(h.lp.step(LoopState::Querying).await, LoopState::Backoff);
        }

        assert!(h.notified.lock().is_empty());
        assert_eq!(h.state.lock().current_port, 0);
    }

    #[tokio::test]
    async fn test_port_change_is_announced_again() {
        let h = harness(vec![
            reply(&[("VRChat-Client-5", 9000)]),
            reply(&[("VRChat-Client-5", 9010)]),
            reply(&[("VRChat-Client-5", 9000)]),
        ]);

        for _ in 0..3 {
            h.lp.step(LoopState::Querying).await;
        }

        assert_eq!(*h.notified.lock(), vec![9000, 9010, 9000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_full_interval() {
        let h = harness(vec![]);

        let started = tokio::time::Instant::now();
        assert_eq!(h.lp.step(LoopState::Backoff).await, LoopState::Querying);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let h = harness(vec![]);

        let trigger = h.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        assert_eq!(h.lp.step(LoopState::Backoff).await, LoopState::Stopped);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_query() {
        // Empty script: the query never returns on its own.
        let h = harness(vec![]);

        let trigger = h.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        assert_eq!(h.lp.step(LoopState::Querying).await, LoopState::Stopped);
        assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_superseded_loop_does_not_publish() {
        let h = harness(vec![reply(&[("VRChat-Client-5", 9000)])]);
        // Cancellation lands after the resolve returned but before publishing.
        assert!(h.lp.publish(9000));
        h.cancel.cancel();
        assert!(!h.lp.publish(9001));

        assert_eq!(*h.notified.lock(), vec![9000]);
        assert_eq!(h.state.lock().current_port, 9000);
    }

    #[tokio::test]
    async fn test_stop_after_sink_read_drops_change() {
        let h = harness(vec![]);
        let sink = h.state.lock().sink.clone().unwrap();

        // Stop lands once the sink was taken out from under the lock.
        h.state.lock().retire();
        assert!(!h.lp.deliver(sink.as_ref(), 9000));

        assert!(h.notified.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_at_backoff_interval_until_cancelled() {
        let h = harness((0..100).map(|_| None).collect());
        let resolver = h.resolver.clone();
        let cancel = h.cancel.clone();

        let task = tokio::spawn(h.lp.run());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        let calls = resolver.calls.load(Ordering::SeqCst);
        assert_eq!(calls, 5, "one attempt per backoff interval");

        cancel.cancel();
        task.await.unwrap();
    }

    #[test]
    fn test_retire_resets_state() {
        let mut state = DiscoveryState::default();
        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());
        state.current_port = 9000;
        assert!(state.is_active());

        state.retire();
        assert!(cancel.is_cancelled());
        assert!(!state.is_active());
        assert!(state.sink.is_none());
        assert_eq!(state.current_port, 0);
    }
}
