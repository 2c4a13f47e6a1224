//! Access-control policies in front of a store
//!
//! Every policy hands out [`StoreFile`]s on a store it owns (or, for
//! [`PrivateClone`], creates). They differ only in who may open and what
//! happens to a caller that may not:
//!
//! | policy          | admission                         | on refusal             |
//! |-----------------|-----------------------------------|------------------------|
//! | `SingleOpen`    | one open handle at a time         | `Busy`                 |
//! | `SingleUser`    | any number of handles, one user   | `NoCapability`         |
//! | `WaitingUser`   | as `SingleUser`                   | sleep until free       |
//! | `PrivateClone`  | everyone, one store per terminal  | `NotTty` without a tty |
//!
//! An admission belongs to the handle that was opened with it and is given
//! back exactly once, when that handle is released or dropped. Nothing else
//! can give it back.
//!
//! A write-only open truncates the store, as with a plain device.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::caller::{Caller, TtyKey, Uid};
use crate::config::ScullConfig;
use crate::error::{Result, ScullError};
use crate::io::OpenFlags;
use crate::store::{Store, StoreFile};
use crate::sync::{SleepLock, WaitQueue};

pub trait AccessPolicy: Send + Sync {
    /// Device name
    fn name(&self) -> &str;

    /// Admit `caller` and open a handle. The admission is returned when
    /// the handle is released or dropped.
    ///
    /// # Errors
    ///
    /// Policy-specific refusal, or the error of the truncating trim.
    fn open(&self, flags: OpenFlags, caller: &Caller) -> Result<StoreFile>;

    /// Free every store the policy owns
    fn teardown(&self);
}

/// Policy-side bookkeeping an [`Admission`] returns to
trait Gate: Send + Sync {
    fn give_back(&self);
}

/// One admission to a policy device, held by the handle it was taken for
pub(crate) struct Admission {
    gate: Arc<dyn Gate>,
    device: String,
    returned: bool,
}

impl Admission {
    fn new(gate: Arc<dyn Gate>, device: &str) -> Self {
        Self {
            gate,
            device: device.to_string(),
            returned: false,
        }
    }

    fn give_back(&mut self) {
        if !self.returned {
            self.returned = true;
            self.gate.give_back();
            log::debug!("{}: admission returned", self.device);
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.give_back();
    }
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Admission(device={}, returned={})", self.device, self.returned)
    }
}

/// Open on behalf of an admitted caller. If the truncating trim fails the
/// admission is dropped here, which gives it back.
fn open_admitted(
    admission: Admission,
    store: Arc<Store>,
    flags: OpenFlags,
    caller: &Caller,
) -> Result<StoreFile> {
    Ok(StoreFile::open(store, flags, caller)?.with_admission(admission))
}

// ============================================================================
// Single open
// ============================================================================

struct Availability {
    available: AtomicBool,
}

impl Gate for Availability {
    fn give_back(&self) {
        self.available.store(true, Ordering::Release);
    }
}

/// One handle at a time, system-wide
pub struct SingleOpen {
    name: String,
    store: Arc<Store>,
    gate: Arc<Availability>,
}

impl SingleOpen {
    #[must_use]
    pub fn new(name: &str, config: &ScullConfig) -> Self {
        Self {
            name: name.to_string(),
            store: Arc::new(Store::new(name, config)),
            gate: Arc::new(Availability {
                available: AtomicBool::new(true),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Whether a handle currently holds the device
    #[must_use]
    pub fn is_held(&self) -> bool {
        !self.gate.available.load(Ordering::Acquire)
    }
}

impl AccessPolicy for SingleOpen {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, flags: OpenFlags, caller: &Caller) -> Result<StoreFile> {
        if self
            .gate
            .available
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("{}: busy, refusing {:?}", self.name, caller.uid);
            return Err(ScullError::Busy);
        }
        let admission = Admission::new(Arc::clone(&self.gate) as Arc<dyn Gate>, &self.name);
        open_admitted(admission, Arc::clone(&self.store), flags, caller)
    }

    fn teardown(&self) {
        self.store.teardown();
    }
}

// ============================================================================
// Single user
// ============================================================================

#[derive(Debug, Default)]
struct Ownership {
    count: usize,
    owner: Option<Uid>,
}

impl Ownership {
    /// Free, owned by the caller's real or effective uid, or overridden by privilege
    fn admits(&self, caller: &Caller) -> bool {
        self.count == 0
            || self.owner == Some(caller.uid)
            || self.owner == Some(caller.euid)
            || caller.privileged
    }

    fn take(&mut self, caller: &Caller) {
        if self.count == 0 {
            self.owner = Some(caller.uid);
        }
        self.count += 1;
    }

    /// Returns true when the last holder left
    fn give_back(&mut self) -> bool {
        self.count = self.count.saturating_sub(1);
        if self.count == 0 {
            self.owner = None;
            true
        } else {
            false
        }
    }
}

struct OwnerGate {
    ownership: Mutex<Ownership>,
}

impl Gate for OwnerGate {
    fn give_back(&self) {
        self.ownership.lock().give_back();
    }
}

/// Many handles, but all from one user at a time
pub struct SingleUser {
    name: String,
    store: Arc<Store>,
    gate: Arc<OwnerGate>,
}

impl SingleUser {
    #[must_use]
    pub fn new(name: &str, config: &ScullConfig) -> Self {
        Self {
            name: name.to_string(),
            store: Arc::new(Store::new(name, config)),
            gate: Arc::new(OwnerGate {
                ownership: Mutex::new(Ownership::default()),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    #[must_use]
    pub fn owner(&self) -> Option<Uid> {
        self.gate.ownership.lock().owner
    }

    /// Number of open handles
    #[must_use]
    pub fn holders(&self) -> usize {
        self.gate.ownership.lock().count
    }
}

impl AccessPolicy for SingleUser {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, flags: OpenFlags, caller: &Caller) -> Result<StoreFile> {
        {
            let mut ownership = self.gate.ownership.lock();
            if !ownership.admits(caller) {
                log::debug!(
                    "{}: owned by {:?}, refusing {:?}",
                    self.name,
                    ownership.owner,
                    caller.uid
                );
                return Err(ScullError::NoCapability);
            }
            ownership.take(caller);
        }
        let admission = Admission::new(Arc::clone(&self.gate) as Arc<dyn Gate>, &self.name);
        open_admitted(admission, Arc::clone(&self.store), flags, caller)
    }

    fn teardown(&self) {
        self.store.teardown();
    }
}

// ============================================================================
// Waiting single user
// ============================================================================

struct WaitingGate {
    ownership: SleepLock<Ownership>,
    released: WaitQueue,
}

impl Gate for WaitingGate {
    fn give_back(&self) {
        let last = self.ownership.lock().give_back();
        if last {
            self.released.wake_all();
        }
    }
}

/// As [`SingleUser`], but a refused caller sleeps until the owner leaves
pub struct WaitingUser {
    name: String,
    store: Arc<Store>,
    gate: Arc<WaitingGate>,
}

impl WaitingUser {
    #[must_use]
    pub fn new(name: &str, config: &ScullConfig) -> Self {
        Self {
            name: name.to_string(),
            store: Arc::new(Store::new(name, config)),
            gate: Arc::new(WaitingGate {
                ownership: SleepLock::new(Ownership::default()),
                released: WaitQueue::new("access.released"),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    #[must_use]
    pub fn owner(&self) -> Option<Uid> {
        self.gate.ownership.lock().owner
    }

    /// Number of open handles
    #[must_use]
    pub fn holders(&self) -> usize {
        self.gate.ownership.lock().count
    }
}

impl AccessPolicy for WaitingUser {
    fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// `WouldBlock` if refused and nonblocking; `Interrupted` if the wait was interrupted.
    fn open(&self, flags: OpenFlags, caller: &Caller) -> Result<StoreFile> {
        {
            let gate = &*self.gate;
            let mut ownership = gate.ownership.lock_interruptible(&caller.interrupt)?;
            while !ownership.admits(caller) {
                if flags.nonblocking {
                    return Err(ScullError::WouldBlock);
                }
                log::debug!(
                    "{}: owned by {:?}, {:?} going to sleep",
                    self.name,
                    ownership.owner,
                    caller.uid
                );
                gate.released
                    .wait(&gate.ownership, &mut ownership, &caller.interrupt)?;
            }
            ownership.take(caller);
        }
        let admission = Admission::new(Arc::clone(&self.gate) as Arc<dyn Gate>, &self.name);
        open_admitted(admission, Arc::clone(&self.store), flags, caller)
    }

    fn teardown(&self) {
        self.store.teardown();
    }
}

// ============================================================================
// Private clone per terminal
// ============================================================================

/// A private store per controlling terminal, created on first open and
/// kept until teardown
pub struct PrivateClone {
    name: String,
    config: ScullConfig,
    clones: Mutex<HashMap<TtyKey, Arc<Store>>>,
}

impl PrivateClone {
    #[must_use]
    pub fn new(name: &str, config: &ScullConfig) -> Self {
        Self {
            name: name.to_string(),
            config: config.clone(),
            clones: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the store for `key`, creating it if missing. The whole
    /// lookup-then-insert runs under the table lock.
    #[must_use]
    pub fn lookup_or_create(&self, key: TtyKey) -> Arc<Store> {
        let mut clones = self.clones.lock();
        Arc::clone(clones.entry(key).or_insert_with(|| {
            log::debug!("{}: creating clone for tty {}", self.name, key.0);
            Arc::new(Store::new(&format!("{}.{}", self.name, key.0), &self.config))
        }))
    }

    #[must_use]
    pub fn clone_count(&self) -> usize {
        self.clones.lock().len()
    }
}

impl AccessPolicy for PrivateClone {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, flags: OpenFlags, caller: &Caller) -> Result<StoreFile> {
        let Some(key) = caller.tty else {
            log::debug!("{}: {:?} has no controlling tty", self.name, caller.uid);
            return Err(ScullError::NotTty);
        };
        // Clones persist until teardown; no admission to return
        StoreFile::open(self.lookup_or_create(key), flags, caller)
    }

    fn teardown(&self) {
        let mut clones = self.clones.lock();
        for store in clones.values() {
            store.teardown();
        }
        clones.clear();
    }
}
