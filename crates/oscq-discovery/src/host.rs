//! Host side of the sidecar protocol.
//!
//! Launches the sidecar executable with `--pid=<our pid>` so it exits with us,
//! and turns its `FOUND:<port>` lines back into ports.

use crate::error::{DiscoveryError, Result};
use oscq_core::protocol::{self, Line};
use std::ffi::OsStr;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A running sidecar and the ports it reported.
pub struct SidecarClient {
    child: Child,
    ports: mpsc::UnboundedReceiver<u16>,
    reader: JoinHandle<()>,
}

impl SidecarClient {
    /// Launches `program --pid=<current pid>`.
    pub fn spawn(program: impl AsRef<OsStr>) -> Result<Self> {
        let mut command = Command::new(program.as_ref());
        command.arg(format!("--pid={}", std::process::id()));
        Self::spawn_command(command)
    }

    /// Launches a prepared command. Stdin is detached, stdout is captured and
    /// stderr is inherited.
    pub fn spawn_command(mut command: Command) -> Result<Self> {
        let program = format!("{:?}", command.as_std().get_program());

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DiscoveryError::SpawnFailed {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| DiscoveryError::SpawnFailed {
            program: program.clone(),
            reason: "stdout was not captured".to_string(),
        })?;

        info!(program = %program, pid = ?child.id(), "Sidecar launched");

        let (tx, ports) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_ports(stdout, tx));

        Ok(Self {
            child,
            ports,
            reader,
        })
    }

    /// Waits for the next reported port. Returns `None` once the sidecar has
    /// closed its stdout.
    pub async fn next_port(&mut self) -> Option<u16> {
        self.ports.recv().await
    }

    /// OS process id of the sidecar, if it is still running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kills the sidecar and waits for it to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        self.reader.abort();
        if let Err(e) = self.child.kill().await {
            // Already exited on its own.
            debug!(error = %e, "Sidecar kill failed");
        }
        Ok(())
    }
}

/// Reads sidecar output line by line until EOF or until nobody listens.
async fn read_ports<R>(output: R, tx: mpsc::UnboundedSender<u16>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(output).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match protocol::classify(&line) {
                Line::Found(port) => {
                    debug!(port, "Sidecar reported port");
                    if tx.send(port).is_err() {
                        break;
                    }
                }
                Line::Malformed(text) => warn!(line = text, "Could not parse port from sidecar line"),
                Line::Diagnostic(text) => debug!(line = text, "Sidecar output"),
            },
            Ok(None) => {
                debug!("Sidecar closed its output");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Error reading sidecar output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_ports_filters_lines() {
        let output: &[u8] = b"Attached to PID 1\nFOUND:9000\nFOUND:nope\r\nFOUND:9001\r\n";
        let (tx, mut rx) = mpsc::unbounded_channel();

        read_ports(output, tx).await;

        assert_eq!(rx.recv().await, Some(9000));
        assert_eq!(rx.recv().await, Some(9001));
        assert_eq!(rx.recv().await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_reads_child_stdout() {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg("echo starting; echo FOUND:9000; echo FOUND:0; echo FOUND:9002");

        let mut client = SidecarClient::spawn_command(command).unwrap();
        assert_eq!(client.next_port().await, Some(9000));
        assert_eq!(client.next_port().await, Some(9002));
        assert_eq!(client.next_port().await, None);

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let result = SidecarClient::spawn("/nonexistent/listen-for-vrc");
        assert!(matches!(result, Err(DiscoveryError::SpawnFailed { .. })));
    }
}
