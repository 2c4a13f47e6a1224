//! Who is calling: credentials, controlling terminal, interrupt token

use crate::idgen::{Handle, IdGen};
use crate::interrupt::Interrupt;

static CALLER_IDS: IdGen = IdGen::new();

/// User identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub u32);

impl Uid {
    pub const ROOT: Uid = Uid(0);
}

/// Controlling-terminal device number, key of the per-terminal clone policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TtyKey(pub u32);

/// Calling context passed to every operation that may sleep
#[derive(Debug, Clone)]
pub struct Caller {
    handle: Handle,
    pub uid: Uid,
    pub euid: Uid,
    pub tty: Option<TtyKey>,
    /// Holds the administrative capability (set commands, owner override)
    pub privileged: bool,
    pub interrupt: Interrupt,
}

impl Caller {
    /// Unprivileged caller with `uid == euid` and no terminal
    #[must_use]
    pub fn new(uid: Uid) -> Self {
        Self {
            handle: CALLER_IDS.next_handle(),
            uid,
            euid: uid,
            tty: None,
            privileged: false,
            interrupt: Interrupt::new(),
        }
    }

    #[must_use]
    pub fn root() -> Self {
        Self::new(Uid::ROOT).with_privilege()
    }

    #[must_use]
    pub fn with_euid(mut self, euid: Uid) -> Self {
        self.euid = euid;
        self
    }

    #[must_use]
    pub fn with_tty(mut self, tty: TtyKey) -> Self {
        self.tty = Some(tty);
        self
    }

    #[must_use]
    pub fn with_privilege(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Unique per `Caller::new`; clones share it
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }
}
