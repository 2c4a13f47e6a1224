//! Open-mode types

/// Access mode requested at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    /// Opening a store write-only truncates it
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    #[must_use]
    pub fn readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    #[must_use]
    pub fn writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// Flags fixed for the lifetime of an open handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub access: AccessMode,
    /// Turn every would-sleep point into `WouldBlock`
    pub nonblocking: bool,
}

impl OpenFlags {
    #[must_use]
    pub fn new(access: AccessMode) -> Self {
        Self {
            access,
            nonblocking: false,
        }
    }

    #[must_use]
    pub fn read_only() -> Self {
        Self::new(AccessMode::ReadOnly)
    }

    #[must_use]
    pub fn write_only() -> Self {
        Self::new(AccessMode::WriteOnly)
    }

    #[must_use]
    pub fn read_write() -> Self {
        Self::new(AccessMode::ReadWrite)
    }

    #[must_use]
    pub fn nonblocking(mut self) -> Self {
        self.nonblocking = true;
        self
    }
}
