//! Parent-process supervision for the sidecar
//!
//! The sidecar is launched by a host application and must never outlive it.
//! [`ParentProcess::attach`] takes a handle to the host's pid at startup (a
//! missing process is fatal), and [`LifecycleSupervisor`] waits for that
//! process on a dedicated thread. When the parent exits, or the wait itself
//! fails, the exit action runs; the standalone binary uses [`terminate`],
//! which ends the whole process immediately.
//!
//! ```no_run
//! use oscq_supervisor::{terminate, LifecycleSupervisor, ParentProcess};
//! use tokio_util::sync::CancellationToken;
//!
//! let parent = ParentProcess::attach(4242)?;
//! let _supervisor = LifecycleSupervisor::spawn(parent, CancellationToken::new(), terminate)?;
//! # Ok::<(), oscq_supervisor::SupervisorError>(())
//! ```

pub mod error;
pub mod process;
pub mod supervisor;

pub use error::{Result, SupervisorError};
pub use process::{ParentProcess, WaitOutcome};
pub use supervisor::{terminate, ExitReason, LifecycleSupervisor};
