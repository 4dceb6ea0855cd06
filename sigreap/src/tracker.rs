//! Descendant tracking via `/proc/<pid>/task/<pid>/children`.
//!
//! There is no blocking "wait until the tree is empty" primitive, so the
//! supervisor re-reads the kernel listing every time it wakes up. Direct
//! children are enough: as subreaper, every orphaned descendant is reparented
//! to us and shows up here.

use std::path::{Path, PathBuf};

use nix::unistd::Pid;

use crate::error::{Result, SupervisorError};

/// Listing entries tracked besides the anchor.
pub const CAPACITY: usize = 64;

/// Outcome of one [`TrackedSet::rebuild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rebuild {
    /// Entries read from the listing before parsing stopped.
    pub listed: usize,
    /// Entries now held in the scratch slots.
    pub tracked: usize,
    /// The listing had more entries than [`CAPACITY`].
    pub overflow: bool,
}

impl Rebuild {
    /// Whether any descendant was alive when the listing was read.
    pub fn active(&self) -> bool {
        self.listed > 0
    }
}

/// Bounded set of pids that receive forwarded signals.
///
/// The anchor (the launched child) is fixed for the lifetime of the set. The
/// scratch slots are replaced wholesale on every rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSet {
    anchor: Pid,
    scratch: [Pid; CAPACITY],
    len: usize,
}

impl TrackedSet {
    pub fn new(anchor: Pid) -> Self {
        Self {
            anchor,
            scratch: [Pid::from_raw(0); CAPACITY],
            len: 0,
        }
    }

    pub fn anchor(&self) -> Pid {
        self.anchor
    }

    /// Scratch entries from the latest rebuild, in listing order.
    pub fn descendants(&self) -> &[Pid] {
        self.scratch.get(..self.len).unwrap_or_default()
    }

    /// Anchor first, then every scratch entry.
    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        std::iter::once(self.anchor).chain(self.descendants().iter().copied())
    }

    /// Replace the scratch entries with the pids in `listing`.
    ///
    /// The listing is whitespace separated decimal pids. Parsing stops once
    /// [`CAPACITY`] entries are held; anything after that is untracked. The
    /// anchor is skipped so it is never signalled twice.
    pub fn rebuild(&mut self, listing: &str) -> Result<Rebuild> {
        let mut listed = 0;
        let mut len = 0;
        let mut overflow = false;

        for token in listing.split_ascii_whitespace() {
            let pid = parse_pid(token)?;
            listed += 1;
            if pid == self.anchor {
                continue;
            }
            match self.scratch.get_mut(len) {
                Some(slot) => {
                    *slot = pid;
                    len += 1;
                }
                None => {
                    overflow = true;
                    break;
                }
            }
        }

        self.len = len;
        Ok(Rebuild {
            listed,
            tracked: len,
            overflow,
        })
    }
}

fn parse_pid(token: &str) -> Result<Pid> {
    token
        .parse::<u32>()
        .ok()
        .and_then(|raw| i32::try_from(raw).ok())
        .filter(|raw| *raw > 0)
        .map(Pid::from_raw)
        .ok_or_else(|| SupervisorError::ListingParse {
            token: token.to_owned(),
        })
}

/// Reader for one process's children listing.
#[derive(Debug, Clone)]
pub struct Tracker {
    path: PathBuf,
}

impl Tracker {
    pub fn for_pid(pid: Pid) -> Self {
        Self {
            path: PathBuf::from(format!("/proc/{pid}/task/{pid}/children")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_listing(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|source| SupervisorError::Listing {
            path: self.path.display().to_string(),
            source,
        })
    }
}
