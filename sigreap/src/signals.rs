//! Signal interception: one handler for every catchable signal.
//!
//! The handler does nothing but write the signal number into a non-blocking
//! self-pipe. Forwarding and reaping happen later on the main loop, which
//! drains the pipe after waking up. Logging from the handler itself would not
//! be async-signal-safe.
//!
//! Handlers are installed with `sigaction` (not `signal`) so they are not
//! reset after the first delivery.

use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicI32, Ordering};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::unistd::{Pid, pipe2};
use tracing::{debug, warn};

use crate::error::{Result, SupervisorError};

/// Write end of the wake pipe, or -1 while no pipe is armed.
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

/// Self-pipe carrying one byte per delivered signal.
pub struct SignalPipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl SignalPipe {
    pub fn open() -> Result<Self> {
        let (read, write) =
            pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK).map_err(SupervisorError::SignalPipe)?;
        Ok(Self { read, write })
    }

    /// Point the signal handler at this pipe.
    pub fn arm(&self) {
        WAKE_FD.store(self.write.as_raw_fd(), Ordering::SeqCst);
    }

    /// Suspend until at least one signal has been posted.
    ///
    /// Returns early on `EINTR`; callers re-evaluate state either way.
    pub fn wait(&self) -> Result<()> {
        let mut fds = [PollFd::new(self.read.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) | Err(Errno::EINTR) => Ok(()),
            Err(e) => Err(SupervisorError::Wait(e)),
        }
    }

    /// Take every signal number posted since the last drain, in delivery order.
    pub fn drain(&self) -> Result<Vec<libc::c_int>> {
        let mut signals = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match nix::unistd::read(self.read.as_fd(), &mut buf) {
                Ok(0) | Err(Errno::EAGAIN) => break,
                Ok(n) => signals.extend(
                    buf.iter()
                        .take(n)
                        .filter(|b| **b != 0)
                        .map(|b| libc::c_int::from(*b)),
                ),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(SupervisorError::SignalPipe(e)),
            }
        }
        Ok(signals)
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        // Disarm before the fd is closed so the handler never writes to a reused fd.
        let _ = WAKE_FD.compare_exchange(
            self.write.as_raw_fd(),
            -1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Signal handler: post the signal number to the wake pipe.
extern "C" fn post_signal(signo: libc::c_int) {
    let saved = Errno::last_raw();
    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0
        && let Ok(byte) = u8::try_from(signo)
    {
        // SAFETY: write(2) is async-signal-safe and `byte` outlives the call.
        // A full pipe drops the notification; enough are already queued to wake the loop.
        unsafe {
            libc::write(fd, std::ptr::from_ref(&byte).cast(), 1);
        }
    }
    Errno::set_raw(saved);
}

/// Install a `sigaction` handler for the given signal number.
///
/// Raw numbers rather than `nix::sys::signal::Signal`, so realtime signals
/// are covered too.
fn set_handler(signo: libc::c_int, handler: libc::sighandler_t) -> nix::Result<()> {
    // SAFETY: zeroed sigaction is valid; we fill sa_sigaction, sa_mask and sa_flags.
    let mut sa: libc::sigaction = unsafe { std::mem::zeroed() };
    sa.sa_sigaction = handler;
    sa.sa_flags = libc::SA_RESTART | libc::SA_NOCLDSTOP;
    // SAFETY: sa.sa_mask is a valid sigset_t owned by this frame.
    unsafe {
        libc::sigfillset(&mut sa.sa_mask);
    }
    // SAFETY: sa is properly initialized; invalid signal numbers fail with EINVAL.
    Errno::result(unsafe { libc::sigaction(signo, &sa, std::ptr::null_mut()) }).map(drop)
}

/// Route every catchable signal through [`post_signal`].
///
/// Signals the kernel refuses (`SIGKILL`, `SIGSTOP`, libc-reserved realtime
/// numbers) are skipped silently. Other failures are logged and skipped.
/// Returns the number of signals now handled.
pub fn install_handlers(pipe: &SignalPipe) -> usize {
    pipe.arm();
    let mut installed = 0;
    for signo in 1..=libc::SIGRTMAX() {
        match set_handler(signo, post_signal as *const () as libc::sighandler_t) {
            Ok(()) => installed += 1,
            Err(Errno::EINVAL) => {}
            Err(e) => warn!("sigaction({signo}): {e}"),
        }
    }
    debug!(installed, "signal handlers installed");
    installed
}

/// Send a raw signal number to one pid.
pub fn send(pid: Pid, signo: libc::c_int) -> nix::Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions.
    Errno::result(unsafe { libc::kill(pid.as_raw(), signo) }).map(drop)
}
