//! Zombie reaping.
//!
//! Drains every pending child state change with `waitpid(-1, WNOHANG)`.
//! Terminations update the last exit code; stop/continue are only logged.
//!
//! Statuses are decoded from the raw `wait` word rather than through
//! `nix::sys::wait::WaitStatus`, which rejects realtime signal numbers after
//! the kernel has already released the child.

use nix::errno::Errno;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::mask::BlockedSignals;

/// A child state change worth acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    /// Exited normally or was killed. `code` is the exit status, or
    /// `128 + signo` for a signal death.
    Terminated { pid: Pid, code: i32 },
    Stopped(Pid),
    Continued(Pid),
}

impl ChildEvent {
    /// Decode a raw `waitpid` status word.
    pub fn from_raw(pid: Pid, status: libc::c_int) -> Option<Self> {
        if libc::WIFEXITED(status) {
            Some(Self::Terminated {
                pid,
                code: libc::WEXITSTATUS(status),
            })
        } else if libc::WIFSIGNALED(status) {
            Some(Self::Terminated {
                pid,
                code: 128 + libc::WTERMSIG(status),
            })
        } else if libc::WIFSTOPPED(status) {
            Some(Self::Stopped(pid))
        } else if libc::WIFCONTINUED(status) {
            Some(Self::Continued(pid))
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct Reaper {
    last_exit_code: i32,
}

impl Reaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit status of the most recently reaped child, zero until one terminates.
    pub fn last_exit_code(&self) -> i32 {
        self.last_exit_code
    }

    /// Collect every pending child state change without blocking.
    ///
    /// Returns the number of children reaped in this pass.
    pub fn reap(&mut self, _blocked: &BlockedSignals) -> usize {
        let flags = libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED;
        let mut reaped = 0;
        loop {
            let mut status: libc::c_int = 0;
            // SAFETY: `status` is a valid out-pointer for the duration of the call.
            let res = Errno::result(unsafe { libc::waitpid(-1, &mut status, flags) });
            match res {
                Ok(0) | Err(Errno::ECHILD) => break,
                Ok(raw) => {
                    if let Some(event) = ChildEvent::from_raw(Pid::from_raw(raw), status)
                        && self.record(event)
                    {
                        reaped += 1;
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!("waitpid: {e}");
                    break;
                }
            }
        }
        if reaped > 0 {
            debug!(reaped, "reap pass finished");
        }
        reaped
    }

    /// Apply one state change. Returns true if the child is gone.
    pub fn record(&mut self, event: ChildEvent) -> bool {
        match event {
            ChildEvent::Terminated { pid, code } => {
                self.last_exit_code = code;
                info!("child: {pid} exit/kill ({code})");
                true
            }
            ChildEvent::Stopped(pid) | ChildEvent::Continued(pid) => {
                info!("child: {pid} stop/cont");
                false
            }
        }
    }
}
