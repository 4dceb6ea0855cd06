//! Signal mask guard.
//!
//! Every code path that touches the tracked pid set or the last exit code runs
//! while holding a [`BlockedSignals`]. Functions that require the mask take a
//! `&BlockedSignals` so the borrow checker enforces the discipline.

use nix::sys::signal::{SigSet, SigmaskHow, sigprocmask};
use tracing::warn;

use crate::error::{Result, SupervisorError};

/// All catchable signals blocked until [`BlockedSignals::release`] (or drop).
#[must_use = "signals are unblocked as soon as the guard is dropped"]
pub struct BlockedSignals {
    previous: Option<SigSet>,
}

impl BlockedSignals {
    pub fn block_all() -> Result<Self> {
        let mut previous = SigSet::empty();
        sigprocmask(
            SigmaskHow::SIG_BLOCK,
            Some(&SigSet::all()),
            Some(&mut previous),
        )
        .map_err(SupervisorError::SignalMask)?;
        Ok(Self {
            previous: Some(previous),
        })
    }

    /// Restore the mask that was active before blocking. Pending signals are
    /// delivered before this returns.
    pub fn release(mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => sigprocmask(SigmaskHow::SIG_SETMASK, Some(&previous), None)
                .map_err(SupervisorError::SignalMask),
            None => Ok(()),
        }
    }
}

impl Drop for BlockedSignals {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take()
            && let Err(e) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&previous), None)
        {
            warn!("sigprocmask(SIG_SETMASK) on drop: {e}");
        }
    }
}

/// Clear the mask entirely. Used in the child branch before exec.
pub fn unblock_all() -> Result<()> {
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)
        .map_err(SupervisorError::SignalMask)
}
