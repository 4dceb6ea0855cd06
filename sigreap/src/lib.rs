//! Minimal PID 1 supervisor.
//!
//! Launches one program, registers as child subreaper so every orphaned
//! descendant is reparented here, forwards every catchable signal to the
//! tracked children, and exits once no descendant remains with the status of
//! the last child reaped.
//!
//! Lifecycle:
//! 1. Become subreaper and open the signal self-pipe
//! 2. Fork/exec the program with all signals blocked
//! 3. Install handlers for every catchable signal
//! 4. Loop: reap, read `/proc/<pid>/task/<pid>/children`, sleep until a signal

pub mod error;
pub mod launcher;
pub mod mask;
pub mod reaper;
pub mod signals;
pub mod supervisor;
pub mod tracker;

use std::ffi::{OsStr, OsString};

pub use error::{Result, SupervisorError};
pub use launcher::Command;
pub use supervisor::Supervisor;

/// Supervise `program` with `args` until its whole process tree has exited.
pub fn run(program: &OsStr, args: &[OsString]) -> Result<i32> {
    let command = Command::new(program, args)?;
    Supervisor::launch(&command)?.run()
}
