//! Launch the supervised program.

use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use nix::sys::signal::{SigHandler, Signal, signal};
use nix::unistd::{ForkResult, Pid, execvp, fork};
use tracing::error;

use crate::error::{Result, SupervisorError, errno_exit_code};
use crate::mask::{self, BlockedSignals};

/// Program and argv, converted before forking so the child never allocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: CString,
    argv: Vec<CString>,
}

impl Command {
    /// `argv[0]` is the program as given; `PATH` is searched at exec time.
    pub fn new(program: &OsStr, args: &[OsString]) -> Result<Self> {
        let program = CString::new(program.as_bytes())?;
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program.clone());
        for arg in args {
            argv.push(CString::new(arg.as_bytes())?);
        }
        Ok(Self { program, argv })
    }

    pub fn program(&self) -> &CString {
        &self.program
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }
}

/// Register as subreaper so orphaned descendants are reparented to us.
///
/// Must happen before the fork: the child may orphan a grandchild before the
/// parent is scheduled again.
pub fn become_subreaper() -> Result<()> {
    nix::sys::prctl::set_child_subreaper(true).map_err(SupervisorError::Subreaper)
}

/// Fork and exec `command`, returning the child's pid in the parent.
///
/// Called with every signal blocked so no handler can run before the parent
/// has recorded the child. The child restores default delivery before exec.
pub fn spawn(command: &Command, _blocked: &BlockedSignals) -> Result<Pid> {
    // SAFETY: single-threaded at this point; the child only resets signal
    // state, execs, or exits.
    match unsafe { fork() }.map_err(SupervisorError::Fork)? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => exec_child(command),
    }
}

fn exec_child(command: &Command) -> ! {
    // The Rust runtime ignores SIGPIPE and exec would keep that disposition.
    // SAFETY: installing SIG_DFL has no handler code to race with.
    let _ = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) };

    if let Err(e) = mask::unblock_all() {
        error!("{e}");
        exit_child(e.exit_code());
    }

    let errno = match execvp(&command.program, command.argv.as_slice()) {
        Err(e) => e,
        Ok(never) => match never {},
    };
    error!("execvp({}): {errno}", command.program.to_string_lossy());
    exit_child(errno_exit_code(errno))
}

/// Leave the forked child without running the parent's atexit handlers.
fn exit_child(code: u8) -> ! {
    // SAFETY: _exit(2) never returns and touches no Rust-managed state.
    unsafe { libc::_exit(libc::c_int::from(code)) }
}
