//! The supervisor thread

use crate::error::{Result, SupervisorError};
use crate::process::{ParentProcess, WaitOutcome};
use std::thread::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Why the supervisor fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The parent process exited
    ParentExited { pid: u32 },
    /// Waiting on the parent failed; treated like an exit
    WaitFailed { pid: u32, reason: String },
}

/// Watches one parent process on a dedicated OS thread.
pub struct LifecycleSupervisor {
    pid: u32,
    cancel: CancellationToken,
    thread: Option<JoinHandle<Option<ExitReason>>>,
}

impl LifecycleSupervisor {
    /// Spawns the watcher thread.
    ///
    /// `on_exit` runs on that thread when the parent exits or the wait fails.
    /// Cancelling `cancel` stops the watch without running it.
    pub fn spawn<F>(parent: ParentProcess, cancel: CancellationToken, on_exit: F) -> Result<Self>
    where
        F: FnOnce(ExitReason) + Send + 'static,
    {
        let pid = parent.pid();
        let token = cancel.clone();

        let thread = thread::Builder::new()
            .name(format!("parent-watch-{}", pid))
            .spawn(move || {
                let reason = match parent.wait_for_exit(&token) {
                    WaitOutcome::Cancelled => return None,
                    WaitOutcome::Exited => ExitReason::ParentExited { pid },
                    WaitOutcome::Failed(e) => {
                        warn!(pid, error = %e, "Waiting on parent process failed");
                        ExitReason::WaitFailed {
                            pid,
                            reason: e.to_string(),
                        }
                    }
                };
                on_exit(reason.clone());
                Some(reason)
            })
            .map_err(SupervisorError::Spawn)?;

        info!(pid, "Supervising parent process");

        Ok(Self {
            pid,
            cancel,
            thread: Some(thread),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Stops watching and waits for the thread. Returns the exit reason if the
    /// supervisor had already fired.
    pub fn cancel(mut self) -> Option<ExitReason> {
        self.cancel.cancel();
        self.thread
            .take()
            .and_then(|thread| thread.join().ok())
            .flatten()
    }
}

impl Drop for LifecycleSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Exit action of the standalone sidecar: ends the whole process at once.
pub fn terminate(reason: ExitReason) {
    match &reason {
        ExitReason::ParentExited { pid } => {
            info!(pid, "Parent process has closed, shutting down");
        }
        ExitReason::WaitFailed { pid, reason } => {
            error!(pid, reason = %reason, "Lost track of parent process, shutting down");
        }
    }
    std::process::exit(0);
}
