//! Standalone sidecar behaviour with a stand-in resolver

use async_trait::async_trait;
use oscq_core::ServiceAnnouncement;
use oscq_discovery::{ChannelSink, DiscoveryConfig, Query, Resolver, Result};
use oscq_finder::Sidecar;
use oscq_supervisor::ExitReason;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Above the largest pid_max Linux allows
const UNUSED_PID: u32 = 0x3FFF_FFFF;

struct CountingResolver {
    calls: AtomicUsize,
    latency: Duration,
}

impl CountingResolver {
    fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            latency,
        })
    }
}

#[async_trait]
impl Resolver for CountingResolver {
    async fn query(
        &self,
        _query: &Query<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceAnnouncement>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => Ok(Vec::new()),
            _ = tokio::time::sleep(self.latency) => Ok(vec![
                ServiceAnnouncement::new("Other-Client", 1, vec![]),
                ServiceAnnouncement::new("VRChat-Client-5", 9000, vec![]),
            ]),
        }
    }
}

fn config() -> DiscoveryConfig {
    DiscoveryConfig {
        backoff_ms: 50,
        ..Default::default()
    }
}

fn never_exits(_: ExitReason) {
    panic!("parent exit not expected");
}

#[tokio::test]
async fn test_missing_parent_performs_no_resolves() {
    let resolver = CountingResolver::new(Duration::ZERO);
    let factory_calls = AtomicUsize::new(0);
    let (sink, mut ports) = ChannelSink::new();

    let sidecar = Sidecar {
        parent_pid: Some(UNUSED_PID),
        config: config(),
        sink: Arc::new(sink),
        on_parent_exit: never_exits,
    };

    let err = sidecar
        .run(
            || {
                factory_calls.fetch_add(1, Ordering::SeqCst);
                Ok(resolver.clone())
            },
            std::future::pending(),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        format!("Process with PID {} is not running. Exiting.", UNUSED_PID)
    );
    assert_eq!(factory_calls.load(Ordering::SeqCst), 0);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    assert!(ports.try_recv().is_err());
}

#[tokio::test]
async fn test_unsupervised_reports_port_once() {
    let resolver = CountingResolver::new(Duration::ZERO);
    let (sink, mut ports) = ChannelSink::new();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let sidecar = Sidecar {
        parent_pid: None,
        config: config(),
        sink: Arc::new(sink),
        on_parent_exit: never_exits,
    };

    let running = tokio::spawn(sidecar.run(
        {
            let resolver = resolver.clone();
            move || Ok(resolver)
        },
        async {
            let _ = stop_rx.await;
        },
    ));

    let port = tokio::time::timeout(Duration::from_secs(2), ports.recv())
        .await
        .unwrap();
    assert_eq!(port, Some(9000));

    // Let a few more identical rounds go by
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(resolver.calls.load(Ordering::SeqCst) >= 2);
    assert!(ports.try_recv().is_err());

    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parent_exit_ends_run_with_resolve_in_flight() {
    use std::time::Instant;

    let mut parent = std::process::Command::new("sleep")
        .arg("0.5")
        .spawn()
        .unwrap();
    let pid = parent.id();
    let reaper = std::thread::spawn(move || {
        parent.wait().unwrap();
        Instant::now()
    });

    // Every resolve outlasts the parent
    let resolver = CountingResolver::new(Duration::from_secs(30));
    let (sink, _ports) = ChannelSink::new();
    let (exit_tx, exit_rx) = oneshot::channel();

    let sidecar = Sidecar {
        parent_pid: Some(pid),
        config: config(),
        sink: Arc::new(sink),
        on_parent_exit: move |reason: ExitReason| {
            let _ = exit_tx.send(reason);
        },
    };

    let (reason_tx, reason_rx) = oneshot::channel();
    let run = sidecar.run(
        {
            let resolver = resolver.clone();
            move || Ok(resolver)
        },
        async move {
            if let Ok(reason) = exit_rx.await {
                let _ = reason_tx.send(reason);
            }
        },
    );

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    let finished = Instant::now();

    let exited = reaper.join().unwrap();
    assert!(finished.duration_since(exited) < Duration::from_secs(1));
    assert_eq!(reason_rx.await.unwrap(), ExitReason::ParentExited { pid });
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}
