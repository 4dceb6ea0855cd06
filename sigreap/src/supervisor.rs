//! The supervisor state machine.
//!
//! RUNNING: block signals, reap, rebuild the tracked set from the kernel
//! listing. If nothing is listed we are DONE. Otherwise WAITING: sleep on the
//! signal pipe, forward whatever arrived, and go back to RUNNING.

use nix::unistd::getpid;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::launcher::{self, Command};
use crate::mask::BlockedSignals;
use crate::reaper::Reaper;
use crate::signals::{self, SignalPipe};
use crate::tracker::{CAPACITY, TrackedSet, Tracker};

pub struct Supervisor {
    pipe: SignalPipe,
    tracker: Tracker,
    tracked: TrackedSet,
    reaper: Reaper,
}

impl Supervisor {
    /// Become subreaper, launch `command` and start intercepting signals.
    pub fn launch(command: &Command) -> Result<Self> {
        launcher::become_subreaper()?;
        let pipe = SignalPipe::open()?;

        let blocked = BlockedSignals::block_all()?;
        let child = launcher::spawn(command, &blocked)?;
        let installed = signals::install_handlers(&pipe);
        let supervisor = Self {
            pipe,
            tracker: Tracker::for_pid(getpid()),
            tracked: TrackedSet::new(child),
            reaper: Reaper::new(),
        };
        info!(
            "launched {} ({} args) as pid {}, forwarding {installed} signals",
            command.program().to_string_lossy(),
            command.argv().len().saturating_sub(1),
            supervisor.tracked.anchor()
        );
        debug!("watching {}", supervisor.tracker.path().display());
        blocked.release()?;

        Ok(supervisor)
    }

    /// Reap, then report whether any descendant is still listed.
    pub fn active(&mut self) -> Result<bool> {
        let blocked = BlockedSignals::block_all()?;
        self.reaper.reap(&blocked);

        let listing = self.tracker.read_listing()?;
        let rebuild = self.tracked.rebuild(&listing)?;
        if rebuild.active() {
            info!("active: true ({}: {})", rebuild.listed, listing.trim_end());
            if rebuild.overflow {
                warn!(
                    "active: too many children, tracking the first {} of {CAPACITY}+",
                    rebuild.tracked
                );
            }
        } else {
            info!("active: false");
        }

        blocked.release()?;
        Ok(rebuild.active())
    }

    /// Forward `signo` to every tracked pid. Failures are logged per pid.
    pub fn forward(&self, signo: libc::c_int, _blocked: &BlockedSignals) {
        for pid in self.tracked.iter() {
            match signals::send(pid, signo) {
                Ok(()) => debug!("forwarded signal {signo} to {pid}"),
                Err(e) => warn!("kill({pid}, {signo}): {e}"),
            }
        }
    }

    /// Sleep until a signal arrives, then handle everything that was posted.
    fn wait_and_dispatch(&mut self) -> Result<()> {
        self.pipe.wait()?;

        let blocked = BlockedSignals::block_all()?;
        for signo in self.pipe.drain()? {
            info!("signal: {signo}");
            // SIGCHLD only wakes us up; the next `active` pass reaps.
            if signo != libc::SIGCHLD {
                self.forward(signo, &blocked);
            }
        }
        blocked.release()
    }

    /// Run until no descendant remains. Returns the last reaped exit status.
    pub fn run(mut self) -> Result<i32> {
        while self.active()? {
            self.wait_and_dispatch()?;
        }
        let code = self.reaper.last_exit_code();
        info!("done: exit status {code}");
        Ok(code)
    }
}
