//! Handle to the supervised parent process

use crate::error::{Result, SupervisorError};
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Longest single blocking wait before the cancellation token is checked again
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Result of waiting on the parent process
#[derive(Debug)]
pub enum WaitOutcome {
    /// The process is gone
    Exited,
    /// The wait was abandoned through the cancellation token
    Cancelled,
    /// The platform wait failed; the process state is unknown
    Failed(io::Error),
}

/// An OS handle to the process that launched the sidecar.
pub struct ParentProcess {
    pid: u32,
    handle: sys::Handle,
}

impl std::fmt::Debug for ParentProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParentProcess").field("pid", &self.pid).finish()
    }
}

impl ParentProcess {
    /// Obtains a handle to `pid`.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::NotRunning`] if no such process exists right now,
    /// [`SupervisorError::InvalidPid`] for pids that cannot name a process.
    pub fn attach(pid: u32) -> Result<Self> {
        if pid == 0 {
            return Err(SupervisorError::InvalidPid { pid });
        }

        let handle = sys::open(pid)?;
        Ok(Self { pid, handle })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Checks whether the process is still running
    pub fn is_alive(&self) -> bool {
        matches!(sys::wait_slice(&self.handle, self.pid, Duration::ZERO), Ok(false))
    }

    /// Blocks until the process exits, the wait fails, or `cancel` fires.
    ///
    /// Cancellation is observed within one poll slice.
    pub fn wait_for_exit(&self, cancel: &CancellationToken) -> WaitOutcome {
        loop {
            if cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }

            match sys::wait_slice(&self.handle, self.pid, POLL_SLICE) {
                Ok(true) => return WaitOutcome::Exited,
                Ok(false) => continue,
                Err(e) => return WaitOutcome::Failed(e),
            }
        }
    }
}

#[cfg(unix)]
mod sys {
    use crate::error::{Result, SupervisorError};
    use std::io;
    use std::time::Duration;

    #[cfg(target_os = "linux")]
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    pub enum Handle {
        /// Pollable process file descriptor
        #[cfg(target_os = "linux")]
        PidFd(OwnedFd),
        /// No process handle available; liveness is probed with signal 0
        Probe,
    }

    pub fn open(pid: u32) -> Result<Handle> {
        let raw = libc::pid_t::try_from(pid).map_err(|_| SupervisorError::InvalidPid { pid })?;

        #[cfg(target_os = "linux")]
        {
            // SAFETY: pidfd_open takes a pid and flags and returns a new fd or -1.
            let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, raw, 0) };
            if fd >= 0 {
                // SAFETY: the descriptor was just created and is owned by nobody else.
                let fd = unsafe { OwnedFd::from_raw_fd(fd as libc::c_int) };
                return Ok(Handle::PidFd(fd));
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ESRCH) => return Err(SupervisorError::NotRunning { pid }),
                // Kernels before 5.3 lack pidfd_open; seccomp filters may reject it.
                Some(libc::ENOSYS) | Some(libc::EPERM) => {
                    tracing::debug!(pid, "pidfd_open unavailable, probing with signals");
                }
                _ => return Err(err.into()),
            }
        }

        if probe(raw)? {
            Ok(Handle::Probe)
        } else {
            Err(SupervisorError::NotRunning { pid })
        }
    }

    /// Waits up to `slice` for the process to exit. Returns true once it has.
    pub fn wait_slice(handle: &Handle, pid: u32, slice: Duration) -> io::Result<bool> {
        match handle {
            #[cfg(target_os = "linux")]
            Handle::PidFd(fd) => {
                let mut pollfd = libc::pollfd {
                    fd: fd.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                };
                let timeout = libc::c_int::try_from(slice.as_millis()).unwrap_or(libc::c_int::MAX);

                // SAFETY: pollfd points to one valid, initialised entry.
                let ready = unsafe { libc::poll(&mut pollfd, 1, timeout) };
                if ready > 0 {
                    return Ok(true);
                }
                if ready == 0 {
                    return Ok(false);
                }

                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
            Handle::Probe => {
                let raw = pid as libc::pid_t;
                if !probe(raw)? {
                    return Ok(true);
                }
                if !slice.is_zero() {
                    std::thread::sleep(slice);
                }
                Ok(false)
            }
        }
    }

    /// Signal 0 performs the permission and existence checks without
    /// delivering anything.
    fn probe(pid: libc::pid_t) -> io::Result<bool> {
        // SAFETY: kill with signal 0 has no side effects.
        if unsafe { libc::kill(pid, 0) } == 0 {
            return Ok(true);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EPERM) => Ok(true),
            Some(libc::ESRCH) => Ok(false),
            _ => Err(err),
        }
    }
}

#[cfg(windows)]
mod sys {
    use crate::error::{Result, SupervisorError};
    use std::io;
    use std::time::Duration;
    use windows_sys::Win32::Foundation::{
        CloseHandle, ERROR_INVALID_PARAMETER, HANDLE, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT,
    };
    use windows_sys::Win32::System::Threading::{
        OpenProcess, WaitForSingleObject, PROCESS_SYNCHRONIZE,
    };

    /// Process handle opened with SYNCHRONIZE access. Holding it pins the
    /// process object, so a reused pid can never be mistaken for the parent.
    pub struct Handle(HANDLE);

    // SAFETY: a process handle is a reference to a kernel object and may be
    // waited on from any thread.
    unsafe impl Send for Handle {}
    unsafe impl Sync for Handle {}

    impl Drop for Handle {
        fn drop(&mut self) {
            // SAFETY: the handle came from OpenProcess and is closed only here.
            unsafe { CloseHandle(self.0) };
        }
    }

    pub fn open(pid: u32) -> Result<Handle> {
        // SAFETY: OpenProcess has no preconditions and returns null on failure.
        let raw = unsafe { OpenProcess(PROCESS_SYNCHRONIZE, 0, pid) };
        if raw.is_null() {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(code) if code as u32 == ERROR_INVALID_PARAMETER => {
                    Err(SupervisorError::NotRunning { pid })
                }
                _ => Err(err.into()),
            };
        }

        // An exited process stays openable while anyone holds a handle to it.
        let handle = Handle(raw);
        if wait_slice(&handle, pid, Duration::ZERO)? {
            return Err(SupervisorError::NotRunning { pid });
        }
        Ok(handle)
    }

    /// Waits up to `slice` for the process to exit. Returns true once it has.
    pub fn wait_slice(handle: &Handle, _pid: u32, slice: Duration) -> io::Result<bool> {
        // u32::MAX means INFINITE
        let millis = u32::try_from(slice.as_millis()).unwrap_or(u32::MAX - 1);

        // SAFETY: the handle stays open for as long as `handle` lives.
        match unsafe { WaitForSingleObject(handle.0, millis) } {
            WAIT_OBJECT_0 => Ok(true),
            WAIT_TIMEOUT => Ok(false),
            WAIT_FAILED => Err(io::Error::last_os_error()),
            other => Err(io::Error::other(format!("unexpected wait result {other:#x}"))),
        }
    }
}
