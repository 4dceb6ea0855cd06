use nix::errno::Errno;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("fork: {0}")]
    Fork(Errno),

    #[error("prctl(PR_SET_CHILD_SUBREAPER): {0}")]
    Subreaper(Errno),

    #[error("sigprocmask: {0}")]
    SignalMask(Errno),

    #[error("signal pipe: {0}")]
    SignalPipe(Errno),

    #[error("wait for signal: {0}")]
    Wait(Errno),

    #[error("invalid argument: {0}")]
    Argument(#[from] std::ffi::NulError),

    #[error("read {path}: {source}")]
    Listing {
        path: String,
        source: std::io::Error,
    },

    #[error("parse children listing: invalid pid {token:?}")]
    ListingParse { token: String },
}

impl SupervisorError {
    /// The OS error behind this failure. Parse failures count as `EINVAL`.
    pub fn errno(&self) -> Errno {
        match self {
            Self::Fork(e)
            | Self::Subreaper(e)
            | Self::SignalMask(e)
            | Self::SignalPipe(e)
            | Self::Wait(e) => *e,
            Self::Listing { source, .. } => source
                .raw_os_error()
                .map(Errno::from_raw)
                .unwrap_or(Errno::EIO),
            Self::Argument(_) | Self::ListingParse { .. } => Errno::EINVAL,
        }
    }

    /// Process exit status for this failure, see [`errno_exit_code`].
    pub fn exit_code(&self) -> u8 {
        errno_exit_code(self.errno())
    }
}

/// Map an errno to a non-zero exit status, `exit(-errno)` style.
///
/// `ENOENT` (2) becomes 254, `EPERM` (1) becomes 255. Anything that would
/// wrap to zero is reported as 255.
pub fn errno_exit_code(errno: Errno) -> u8 {
    let code = (256 - (errno as i32).rem_euclid(256)).rem_euclid(256);
    u8::try_from(code)
        .ok()
        .filter(|c| *c != 0)
        .unwrap_or(u8::MAX)
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
