//! Interruptible sleeping lock and wait queue
//!
//! `SleepLock` is a `parking_lot::Mutex` whose acquisition gives up with
//! `Interrupted` when the caller's token is raised while it is blocked.
//! `WaitQueue` is a `Condvar` bound to a `SleepLock`; a wait releases the
//! lock, sleeps, and re-acquires it before returning, so callers keep the
//! classic "while !condition { wait }" loop and recheck after every wakeup.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, ScullError};
use crate::interrupt::Interrupt;

/// How often a contended acquisition looks at the interrupt token
const LOCK_POLL: Duration = Duration::from_millis(5);

pub(crate) struct SleepLock<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> SleepLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Acquire, giving up with `Interrupted` if the token is raised while
    /// the lock is contended. An uncontended lock is taken even when an
    /// interrupt is pending.
    ///
    /// A contended acquisition is not woken by `raise`: it retries in
    /// `LOCK_POLL` slices and sees the interrupt at the next slice.
    pub fn lock_interruptible(&self, interrupt: &Interrupt) -> Result<MutexGuard<'_, T>> {
        if let Some(guard) = self.inner.try_lock() {
            return Ok(guard);
        }
        loop {
            interrupt.check()?;
            if let Some(guard) = self.inner.try_lock_for(LOCK_POLL) {
                return Ok(guard);
            }
        }
    }

    /// Acquire unconditionally; used on release and teardown paths
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }
}

pub(crate) struct WaitQueue {
    cond: Arc<Condvar>,
    name: &'static str,
}

impl WaitQueue {
    pub fn new(name: &'static str) -> Self {
        Self {
            cond: Arc::new(Condvar::new()),
            name,
        }
    }

    /// Sleep once on this queue.
    ///
    /// Precondition: `guard` belongs to `lock`.
    /// Post-condition: the lock is held again, whether the result is `Ok`
    /// or `Err`. Dropping the guard on the error path releases it.
    ///
    /// Returns `Ok` on any wakeup, including spurious ones; the caller
    /// rechecks its condition.
    pub fn wait<T: Send + 'static>(
        &self,
        lock: &SleepLock<T>,
        guard: &mut MutexGuard<'_, T>,
        interrupt: &Interrupt,
    ) -> Result<()> {
        let mutex = Arc::clone(&lock.inner);
        let cond = Arc::clone(&self.cond);
        let armed = interrupt.arm(Arc::new(move || {
            let _held = mutex.lock();
            cond.notify_all();
        }))?;

        self.cond.wait(guard);
        drop(armed);

        if interrupt.is_pending() {
            log::debug!("{}: wait interrupted", self.name);
            return Err(ScullError::Interrupted);
        }
        Ok(())
    }

    /// Wake every sleeper; each rechecks its own condition
    pub fn wake_all(&self) {
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_wait_is_woken_by_wake_all() {
        let lock = Arc::new(SleepLock::new(false));
        let queue = Arc::new(WaitQueue::new("test"));

        let (lock2, queue2) = (Arc::clone(&lock), Arc::clone(&queue));
        let waiter = thread::spawn(move || {
            let intr = Interrupt::new();
            let mut guard = lock2.lock_interruptible(&intr).unwrap();
            while !*guard {
                queue2.wait(&lock2, &mut guard, &intr).unwrap();
            }
        });

        *lock.lock() = true;
        queue.wake_all();
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_is_interrupted() {
        let lock = Arc::new(SleepLock::new(()));
        let queue = Arc::new(WaitQueue::new("test"));
        let intr = Interrupt::new();
        let (ready_tx, ready_rx) = mpsc::channel();

        let (lock2, queue2, intr2) = (Arc::clone(&lock), Arc::clone(&queue), intr.clone());
        let waiter = thread::spawn(move || {
            let mut guard = lock2.lock_interruptible(&intr2).unwrap();
            ready_tx.send(()).unwrap();
            loop {
                if let Err(e) = queue2.wait(&lock2, &mut guard, &intr2) {
                    return e;
                }
            }
        });

        ready_rx.recv().unwrap();
        intr.raise();
        assert_eq!(waiter.join().unwrap(), ScullError::Interrupted);
    }

    #[test]
    fn test_contended_lock_is_interruptible() {
        let lock = Arc::new(SleepLock::new(0u32));
        let intr = Interrupt::new();
        let held = lock.lock();

        let (lock2, intr2) = (Arc::clone(&lock), intr.clone());
        let waiter = thread::spawn(move || lock2.lock_interruptible(&intr2).map(|_| ()));

        intr.raise();
        assert_eq!(waiter.join().unwrap(), Err(ScullError::Interrupted));
        drop(held);
    }
}
