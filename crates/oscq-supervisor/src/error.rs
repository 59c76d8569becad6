//! Error types for parent-process supervision

use thiserror::Error;

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// No process with this pid exists
    #[error("Process with PID {pid} is not running")]
    NotRunning { pid: u32 },

    /// The pid cannot name a process
    #[error("Invalid PID {pid}")]
    InvalidPid { pid: u32 },

    /// The supervisor thread could not be started
    #[error("Failed to spawn supervisor thread: {0}")]
    Spawn(std::io::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
