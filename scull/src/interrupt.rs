//! Per-caller interrupt token
//!
//! Stands in for a pending signal. A caller suspended on a device lock or
//! wait queue unwinds with [`ScullError::Interrupted`] once its token is
//! raised from another thread.
//!
//! # Wakeup protocol
//!
//! The waiter, while holding the device lock:
//!
//! 10. arms the token with a waker for the queue it is about to sleep on
//! 20. checks `is_pending()`; bails out if set
//! 30. sleeps on the queue (atomically releasing the device lock)
//!
//! The interrupter:
//!
//! 40. sets the pending flag
//! 50. takes the armed waker (if any) and calls it
//!
//! The waker re-acquires the device lock before notifying, so step 50 can
//! only complete after the waiter reached step 30. Either the waiter sees
//! the flag at step 20 or it is asleep when the notification arrives.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, ScullError};

pub(crate) type Waker = Arc<dyn Fn() + Send + Sync>;

struct InterruptInner {
    pending: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

/// Cloneable interrupt flag; clones share state
#[derive(Clone)]
pub struct Interrupt {
    inner: Arc<InterruptInner>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InterruptInner {
                pending: AtomicBool::new(false),
                waker: Mutex::new(None),
            }),
        }
    }

    /// Mark the interrupt pending and wake the wait the owner sleeps in
    pub fn raise(&self) {
        self.inner.pending.store(true, Ordering::SeqCst);
        // Clone out so the waker runs without our mutex held
        let waker = self.inner.waker.lock().clone();
        if let Some(waker) = waker {
            log::debug!("interrupt: waking suspended caller");
            waker();
        }
    }

    /// Acknowledge a delivered interrupt
    pub fn clear(&self) {
        self.inner.pending.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Fail fast if an interrupt is pending
    pub(crate) fn check(&self) -> Result<()> {
        if self.is_pending() {
            Err(ScullError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Register `waker` for the duration of one wait.
    ///
    /// Fails with `Interrupted` (leaving nothing registered) if the token
    /// is already pending.
    pub(crate) fn arm(&self, waker: Waker) -> Result<Armed<'_>> {
        *self.inner.waker.lock() = Some(waker);
        if self.is_pending() {
            *self.inner.waker.lock() = None;
            return Err(ScullError::Interrupted);
        }
        Ok(Armed { interrupt: self })
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

/// Registration guard returned by [`Interrupt::arm`]; disarms on drop
pub(crate) struct Armed<'a> {
    interrupt: &'a Interrupt,
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        *self.interrupt.inner.waker.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_raise_calls_armed_waker() {
        let intr = Interrupt::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let armed = intr
            .arm(Arc::new(move || {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        intr.raise();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        drop(armed);

        // Disarmed: raising again does not call the old waker
        intr.raise();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_arm_fails_when_pending() {
        let intr = Interrupt::new();
        intr.raise();
        assert_eq!(intr.arm(Arc::new(|| {})).err(), Some(ScullError::Interrupted));
        intr.clear();
        assert!(intr.arm(Arc::new(|| {})).is_ok());
    }
}
