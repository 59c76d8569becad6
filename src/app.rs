//! Standalone sidecar orchestration

use crate::cli::Cli;
use anyhow::{anyhow, Context, Result};
use oscq_core::{logging, DiscoveryConfig};
use oscq_discovery::{MdnsResolver, PortListener, PortSink, Resolver, StdoutSink};
use oscq_supervisor::{terminate, ExitReason, LifecycleSupervisor, ParentProcess};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the sidecar until ctrl-c or until the supervised parent exits.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    logging::init(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = ?cli.pid,
        "Starting listen-for-vrc"
    );

    let sidecar = Sidecar {
        parent_pid: cli.pid,
        config: config.discovery,
        sink: Arc::new(StdoutSink::stdout()),
        on_parent_exit: terminate,
    };

    sidecar
        .run(
            || MdnsResolver::new().context("Failed to start mDNS daemon"),
            shutdown_signal(),
        )
        .await
}

/// Everything the sidecar needs besides the resolver
pub struct Sidecar<E> {
    /// Host process to follow, if any
    pub parent_pid: Option<u32>,
    pub config: DiscoveryConfig,
    /// Where port changes go
    pub sink: Arc<dyn PortSink>,
    /// Exit action once the parent is gone
    pub on_parent_exit: E,
}

impl<E> Sidecar<E>
where
    E: FnOnce(ExitReason) + Send + 'static,
{
    /// Checks the parent, then discovers until `shutdown` resolves.
    ///
    /// The parent check runs before `make_resolver`: when the parent is not
    /// running no resolver is ever created.
    pub async fn run<R, F, S>(self, make_resolver: F, shutdown: S) -> Result<()>
    where
        R: Resolver + 'static,
        F: FnOnce() -> Result<R>,
        S: Future<Output = ()>,
    {
        let cancel = CancellationToken::new();

        let _supervisor = match self.parent_pid {
            Some(pid) => {
                let parent =
                    ParentProcess::attach(pid).map_err(|e| anyhow!("{}. Exiting.", e))?;
                Some(LifecycleSupervisor::spawn(parent, cancel.clone(), self.on_parent_exit)?)
            }
            None => {
                warn!("No --pid given, running without parent supervision");
                None
            }
        };

        let listener = PortListener::new(make_resolver()?, &self.config)?;
        listener.start(Some(self.sink));

        shutdown.await;

        info!("Shutting down");
        listener.stop();
        cancel.cancel();
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
}
