//! Error type shared by every device in the crate
//!
//! Each variant corresponds to one classic errno value, so callers at an
//! outer boundary (a syscall shim, an FFI layer) can translate without
//! guessing. See [`ScullError::errno`].

use std::io;

/// Errors produced by stores, pipes, access policies and the control channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScullError {
    /// Node, quantum or pipe buffer allocation failed
    #[error("out of memory")]
    OutOfMemory,

    /// A lock or condition wait was aborted by an interrupt; safe to retry
    #[error("interrupted, restart the call")]
    Interrupted,

    /// Nonblocking call found no data (read) or no space (write)
    #[error("operation would block")]
    WouldBlock,

    /// Copy across the caller boundary failed
    #[error("bad address")]
    BadAddress,

    /// Privileged control operation issued by an unprivileged caller
    #[error("operation not permitted")]
    PermissionDenied,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Exclusive device is already held
    #[error("device or resource busy")]
    Busy,

    /// Device is owned by another identity
    #[error("device is owned by another user")]
    NoCapability,

    #[error("no such device: {0}")]
    NoDevice(usize),

    /// Per-terminal device opened by a caller without a controlling terminal
    #[error("caller has no controlling terminal")]
    NotTty,

    #[error("unknown control command: {0}")]
    UnknownCommand(u32),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ScullError>;

impl ScullError {
    /// Positive errno value for this error
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::OutOfMemory => 12,           // ENOMEM
            Self::Interrupted => 512,          // ERESTARTSYS
            Self::WouldBlock => 11,            // EAGAIN
            Self::BadAddress => 14,            // EFAULT
            Self::PermissionDenied => 1,       // EPERM
            Self::InvalidArgument(_) => 22,    // EINVAL
            Self::Config(_) => 22,             // EINVAL
            Self::Busy => 16,                  // EBUSY
            Self::NoCapability => 13,          // EACCES
            Self::NoDevice(_) => 19,           // ENODEV
            Self::NotTty | Self::UnknownCommand(_) => 25, // ENOTTY
        }
    }

    /// Whether reissuing the same call may succeed without any other change
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Interrupted | Self::WouldBlock)
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl embedded_io::Error for ScullError {
    #[allow(clippy::match_same_arms)]
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            Self::Interrupted => embedded_io::ErrorKind::Interrupted,
            Self::PermissionDenied | Self::NoCapability => {
                embedded_io::ErrorKind::PermissionDenied
            }
            Self::InvalidArgument(_) | Self::Config(_) => embedded_io::ErrorKind::InvalidInput,
            Self::NoDevice(_) => embedded_io::ErrorKind::NotFound,
            Self::UnknownCommand(_) | Self::NotTty => embedded_io::ErrorKind::Unsupported,
            // embedded_io has no WouldBlock; EAGAIN maps to Other
            Self::WouldBlock | Self::BadAddress | Self::Busy => embedded_io::ErrorKind::Other,
        }
    }
}

impl From<ScullError> for io::Error {
    fn from(e: ScullError) -> Self {
        let kind = match e {
            ScullError::OutOfMemory => io::ErrorKind::OutOfMemory,
            ScullError::Interrupted => io::ErrorKind::Interrupted,
            ScullError::WouldBlock => io::ErrorKind::WouldBlock,
            ScullError::PermissionDenied | ScullError::NoCapability => {
                io::ErrorKind::PermissionDenied
            }
            ScullError::InvalidArgument(_) | ScullError::Config(_) => io::ErrorKind::InvalidInput,
            ScullError::NoDevice(_) => io::ErrorKind::NotFound,
            ScullError::UnknownCommand(_) | ScullError::NotTty => io::ErrorKind::Unsupported,
            ScullError::BadAddress | ScullError::Busy => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}
