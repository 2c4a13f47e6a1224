//! Bounded circular-buffer pipe
//!
//! A FIFO byte channel shared by any number of readers and writers:
//! - The buffer is allocated by the first open and freed by the last release
//! - `rp == wp` means empty; one byte is kept free so full is `wp + 1 == rp`
//! - A read or write never wraps mid-copy: it stops at the physical end of
//!   the buffer and the caller comes back for the rest
//! - Readers sleep on `data_available`, writers on `space_available`;
//!   nonblocking handles get `WouldBlock` instead
//! - Async subscribers hear about every empty -> non-empty transition
//!
//! # Thread Safety
//!
//! All state lives behind one sleeping lock. A sleeper releases it while
//! suspended and holds it again whenever a wait returns, including on the
//! error path, where dropping the guard releases it.

use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::caller::Caller;
use crate::config::ScullConfig;
use crate::error::{Result, ScullError};
use crate::idgen::{Handle, IdGen};
use crate::io::{OpenFlags, UserBuf, UserBufMut};
use crate::notification_queue::{NotificationQueue, PipeEvent};
use crate::sync::{SleepLock, WaitQueue};

bitflags::bitflags! {
    /// Readiness mask reported by [`Pipe::poll`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Readiness: u32 {
        const READABLE = 0x0001;
        const WRITABLE = 0x0004;
        const READ_NORM = 0x0040;
        const WRITE_NORM = 0x0100;
    }
}

impl Readiness {
    /// `READABLE | READ_NORM`
    pub const IN: Readiness = Readiness::READABLE.union(Readiness::READ_NORM);
    /// `WRITABLE | WRITE_NORM`
    pub const OUT: Readiness = Readiness::WRITABLE.union(Readiness::WRITE_NORM);
}

struct PipeState {
    buffer: Option<Box<[u8]>>,
    rp: usize,
    wp: usize,
    nreaders: usize,
    nwriters: usize,
    /// Capacity used by the next allocation
    buffer_size: usize,
}

impl PipeState {
    fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.len())
    }

    fn is_empty(&self) -> bool {
        self.rp == self.wp
    }

    fn space_free(&self) -> usize {
        let cap = self.capacity();
        if cap == 0 {
            0
        } else if self.rp == self.wp {
            cap - 1
        } else {
            (self.rp + cap - self.wp) % cap - 1
        }
    }

    fn readiness(&self) -> Readiness {
        let mut mask = Readiness::empty();
        if self.buffer.is_some() && !self.is_empty() {
            mask |= Readiness::IN;
        }
        if self.space_free() > 0 {
            mask |= Readiness::OUT;
        }
        mask
    }

    fn ensure_open(&self, name: &str) -> Result<()> {
        if self.buffer.is_none() {
            return Err(ScullError::invalid(format!("{name} is not open")));
        }
        Ok(())
    }
}

/// Snapshot of a pipe for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeStatus {
    pub name: String,
    /// Allocated capacity, 0 when no buffer is allocated
    pub capacity: usize,
    pub buffer_size: usize,
    pub rp: usize,
    pub wp: usize,
    pub nreaders: usize,
    pub nwriters: usize,
    pub free: usize,
    pub subscribers: usize,
}

impl fmt::Display for PipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Pipe {}: buffer {} (next {}), rp {}, wp {}, free {}",
            self.name, self.capacity, self.buffer_size, self.rp, self.wp, self.free
        )?;
        writeln!(
            f,
            "  readers {}, writers {}, async subscribers {}",
            self.nreaders, self.nwriters, self.subscribers
        )
    }
}

pub struct Pipe {
    name: String,
    state: SleepLock<PipeState>,
    data_available: WaitQueue,
    space_available: WaitQueue,
    /// Woken on every transfer; used by `wait_ready`
    ready_changed: WaitQueue,
    async_queue: NotificationQueue,
    handles: IdGen,
}

impl Pipe {
    #[must_use]
    pub fn new(name: &str, config: &ScullConfig) -> Self {
        Self::with_buffer_size(name, config.pipe_buffer)
    }

    #[must_use]
    pub fn with_buffer_size(name: &str, buffer_size: usize) -> Self {
        Self {
            name: name.to_string(),
            state: SleepLock::new(PipeState {
                buffer: None,
                rp: 0,
                wp: 0,
                nreaders: 0,
                nwriters: 0,
                buffer_size,
            }),
            data_available: WaitQueue::new("pipe.data_available"),
            space_available: WaitQueue::new("pipe.space_available"),
            ready_changed: WaitQueue::new("pipe.ready_changed"),
            async_queue: NotificationQueue::new(),
            handles: IdGen::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a handle; the first opener allocates the buffer.
    ///
    /// # Errors
    ///
    /// - `Interrupted` if the lock wait was interrupted
    /// - `OutOfMemory` if the buffer could not be allocated
    pub fn open(self: &Arc<Self>, flags: OpenFlags, caller: &Caller) -> Result<PipeFile> {
        let mut state = self.state.lock_interruptible(&caller.interrupt)?;

        if state.buffer.is_none() {
            let size = state.buffer_size;
            if size < 2 {
                return Err(ScullError::invalid(format!("pipe buffer size {size} too small")));
            }
            let mut data = Vec::new();
            data.try_reserve_exact(size)
                .map_err(|_| ScullError::OutOfMemory)?;
            data.resize(size, 0);
            state.buffer = Some(data.into_boxed_slice());
            state.rp = 0;
            state.wp = 0;
            log::debug!("{}: allocated {size}-byte buffer", self.name);
        }
        if flags.access.readable() {
            state.nreaders += 1;
        }
        if flags.access.writable() {
            state.nwriters += 1;
        }
        drop(state);

        Ok(PipeFile {
            pipe: Arc::clone(self),
            handle: self.handles.next_handle(),
            flags,
            caller: caller.clone(),
            released: false,
        })
    }

    /// Undo one `open`; the last release frees the buffer
    fn release(&self, handle: Handle, flags: OpenFlags) {
        self.async_queue.unsubscribe(handle);

        let mut state = self.state.lock();
        if flags.access.readable() {
            state.nreaders = state.nreaders.saturating_sub(1);
        }
        if flags.access.writable() {
            state.nwriters = state.nwriters.saturating_sub(1);
        }
        if state.nreaders + state.nwriters == 0 {
            state.buffer = None;
            state.rp = 0;
            state.wp = 0;
            log::debug!("{}: last handle released, buffer freed", self.name);
        }
    }

    /// Read up to `buf.len()` bytes, sleeping while the pipe is empty.
    ///
    /// Stops at the physical end of the buffer, so a wrapped pipe needs
    /// two reads to drain.
    ///
    /// # Errors
    ///
    /// - `WouldBlock` if empty and `nonblocking`
    /// - `Interrupted` if a lock or data wait was interrupted
    /// - `BadAddress` if copying into `buf` failed (nothing is consumed)
    /// - `InvalidArgument` if the pipe has no buffer (never opened)
    pub fn read<B: UserBufMut + ?Sized>(
        &self,
        buf: &mut B,
        nonblocking: bool,
        caller: &Caller,
    ) -> Result<usize> {
        let mut state = self.state.lock_interruptible(&caller.interrupt)?;

        loop {
            state.ensure_open(&self.name)?;
            if !state.is_empty() {
                break;
            }
            if nonblocking {
                return Err(ScullError::WouldBlock);
            }
            log::debug!("{}: reader {:?} going to sleep", self.name, caller.handle());
            self.data_available
                .wait(&self.state, &mut state, &caller.interrupt)?;
        }

        let st = &mut *state;
        let cap = st.capacity();
        let available = if st.wp > st.rp {
            st.wp - st.rp
        } else {
            cap - st.rp
        };
        let count = buf.len().min(available);
        let rp = st.rp;
        let data = st.buffer.as_deref().unwrap_or_default();
        buf.copy_in(&data[rp..rp + count])
            .map_err(|_| ScullError::BadAddress)?;

        st.rp += count;
        if st.rp == cap {
            st.rp = 0;
        }
        drop(state);

        self.space_available.wake_all();
        self.ready_changed.wake_all();
        log::debug!("{}: {:?} read {count} bytes", self.name, caller.handle());
        Ok(count)
    }

    /// Write up to `buf.len()` bytes, sleeping while the pipe is full.
    ///
    /// Accepts at most the free space, and stops at the physical end of the
    /// buffer (or one byte short of `rp`).
    ///
    /// # Errors
    ///
    /// - `WouldBlock` if full and `nonblocking`
    /// - `Interrupted` if a lock or space wait was interrupted
    /// - `BadAddress` if copying from `buf` failed (`wp` is not advanced)
    /// - `InvalidArgument` if the pipe has no buffer (never opened)
    pub fn write<B: UserBuf + ?Sized>(
        &self,
        buf: &B,
        nonblocking: bool,
        caller: &Caller,
    ) -> Result<usize> {
        let mut state = self.state.lock_interruptible(&caller.interrupt)?;

        loop {
            state.ensure_open(&self.name)?;
            if state.space_free() > 0 {
                break;
            }
            if nonblocking {
                return Err(ScullError::WouldBlock);
            }
            log::debug!("{}: writer {:?} going to sleep", self.name, caller.handle());
            self.space_available
                .wait(&self.state, &mut state, &caller.interrupt)?;
        }

        let st = &mut *state;
        let cap = st.capacity();
        let mut count = buf.len().min(st.space_free());
        count = if st.wp >= st.rp {
            count.min(cap - st.wp)
        } else {
            count.min(st.rp - st.wp - 1)
        };
        let was_empty = st.is_empty();
        let wp = st.wp;
        let data = st.buffer.as_deref_mut().unwrap_or_default();
        buf.copy_out(&mut data[wp..wp + count])
            .map_err(|_| ScullError::BadAddress)?;

        st.wp += count;
        if st.wp == cap {
            st.wp = 0;
        }
        drop(state);

        self.data_available.wake_all();
        self.ready_changed.wake_all();
        if was_empty && count > 0 {
            self.async_queue.notify(PipeEvent::Readable);
        }
        log::debug!("{}: {:?} wrote {count} bytes", self.name, caller.handle());
        Ok(count)
    }

    /// Current readiness; never sleeps on a condition.
    ///
    /// A snapshot only: the caller is not registered for a later wakeup.
    /// [`Pipe::wait_ready`] is the registering form, sleeping on the same
    /// queue every transfer wakes.
    #[must_use]
    pub fn poll(&self) -> Readiness {
        self.state.lock().readiness()
    }

    /// Sleep until any bit of `interest` is ready, then return the full mask
    ///
    /// # Errors
    ///
    /// - `WouldBlock` if nothing is ready and `nonblocking`
    /// - `Interrupted` if a lock or readiness wait was interrupted
    pub fn wait_ready(
        &self,
        interest: Readiness,
        nonblocking: bool,
        caller: &Caller,
    ) -> Result<Readiness> {
        let mut state = self.state.lock_interruptible(&caller.interrupt)?;
        loop {
            let mask = state.readiness();
            if mask.intersects(interest) {
                return Ok(mask);
            }
            if nonblocking {
                return Err(ScullError::WouldBlock);
            }
            self.ready_changed
                .wait(&self.state, &mut state, &caller.interrupt)?;
        }
    }

    /// Opt `handle` in to async readiness notification
    #[must_use]
    pub fn subscribe(&self, handle: Handle, channel_capacity: usize) -> broadcast::Receiver<PipeEvent> {
        self.async_queue
            .subscribe(handle, channel_capacity, &format!("{}.{}", self.name, handle.id()))
    }

    /// Opt `handle` out; returns whether it was subscribed
    pub fn unsubscribe(&self, handle: Handle) -> bool {
        self.async_queue.unsubscribe(handle)
    }

    /// Capacity the next allocation will use
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.state.lock().buffer_size
    }

    /// Set the capacity for the next allocation; returns the previous value
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `size` is below 2.
    pub fn set_buffer_size(&self, size: usize) -> Result<usize> {
        if size < 2 {
            return Err(ScullError::invalid(format!("pipe buffer size {size} too small")));
        }
        Ok(std::mem::replace(&mut self.state.lock().buffer_size, size))
    }

    #[must_use]
    pub fn status(&self) -> PipeStatus {
        let state = self.state.lock();
        PipeStatus {
            name: self.name.clone(),
            capacity: state.capacity(),
            buffer_size: state.buffer_size,
            rp: state.rp,
            wp: state.wp,
            nreaders: state.nreaders,
            nwriters: state.nwriters,
            free: state.space_free(),
            subscribers: self.async_queue.len(),
        }
    }

    /// Drop the buffer regardless of open handles
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        state.buffer = None;
        state.rp = 0;
        state.wp = 0;
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "Pipe(name={}, capacity={}, rp={}, wp={}, readers={}, writers={})",
            self.name,
            state.capacity(),
            state.rp,
            state.wp,
            state.nreaders,
            state.nwriters
        )
    }
}

/// Open handle on a [`Pipe`]; releasing (or dropping) it undoes the open
pub struct PipeFile {
    pipe: Arc<Pipe>,
    handle: Handle,
    flags: OpenFlags,
    caller: Caller,
    released: bool,
}

impl PipeFile {
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[must_use]
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    #[must_use]
    pub fn pipe(&self) -> &Arc<Pipe> {
        &self.pipe
    }

    #[must_use]
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Toggle nonblocking mode for later calls
    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.flags.nonblocking = nonblocking;
    }

    /// # Errors
    ///
    /// `InvalidArgument` on a write-only handle, otherwise as [`Pipe::read`].
    pub fn read<B: UserBufMut + ?Sized>(&mut self, buf: &mut B) -> Result<usize> {
        if !self.flags.access.readable() {
            return Err(ScullError::invalid("handle not open for reading"));
        }
        self.pipe.read(buf, self.flags.nonblocking, &self.caller)
    }

    /// # Errors
    ///
    /// `InvalidArgument` on a read-only handle, otherwise as [`Pipe::write`].
    pub fn write<B: UserBuf + ?Sized>(&mut self, buf: &B) -> Result<usize> {
        if !self.flags.access.writable() {
            return Err(ScullError::invalid("handle not open for writing"));
        }
        self.pipe.write(buf, self.flags.nonblocking, &self.caller)
    }

    /// Snapshot readiness; see [`PipeFile::wait_ready`] to sleep until ready
    #[must_use]
    pub fn poll(&self) -> Readiness {
        self.pipe.poll()
    }

    /// # Errors
    ///
    /// As [`Pipe::wait_ready`].
    pub fn wait_ready(&self, interest: Readiness) -> Result<Readiness> {
        self.pipe
            .wait_ready(interest, self.flags.nonblocking, &self.caller)
    }

    /// Opt in to async notification (the fasync equivalent)
    #[must_use]
    pub fn subscribe(&self, channel_capacity: usize) -> broadcast::Receiver<PipeEvent> {
        self.pipe.subscribe(self.handle, channel_capacity)
    }

    pub fn unsubscribe(&self) -> bool {
        self.pipe.unsubscribe(self.handle)
    }

    /// Release explicitly; equivalent to dropping the handle
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.pipe.release(self.handle, self.flags);
        }
    }
}

impl Drop for PipeFile {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for PipeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PipeFile(pipe={}, handle={:?}, flags={:?})",
            self.pipe.name(),
            self.handle,
            self.flags
        )
    }
}

impl embedded_io::ErrorType for PipeFile {
    type Error = ScullError;
}

impl embedded_io::Read for PipeFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        PipeFile::read(self, buf)
    }
}

impl embedded_io::Write for PipeFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        PipeFile::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::Uid;

    #[test]
    fn test_space_free_formula() {
        let mut state = PipeState {
            buffer: Some(vec![0u8; 8].into_boxed_slice()),
            rp: 0,
            wp: 0,
            nreaders: 0,
            nwriters: 0,
            buffer_size: 8,
        };
        assert_eq!(state.space_free(), 7);
        state.wp = 7;
        assert_eq!(state.space_free(), 0);
        state.rp = 3;
        state.wp = 1;
        assert_eq!(state.space_free(), 1);
    }

    #[test]
    fn test_unopened_pipe_rejects_io() {
        let pipe = Pipe::with_buffer_size("p", 8);
        let caller = Caller::new(Uid(1));
        let mut buf = [0u8; 4];
        assert!(matches!(
            pipe.read(&mut buf, true, &caller),
            Err(ScullError::InvalidArgument(_))
        ));
        assert_eq!(pipe.poll(), Readiness::empty());
    }

    #[test]
    fn test_last_release_frees_buffer() {
        let pipe = Arc::new(Pipe::with_buffer_size("p", 8));
        let caller = Caller::new(Uid(1));
        let reader = pipe.open(OpenFlags::read_only(), &caller).unwrap();
        let writer = pipe.open(OpenFlags::write_only(), &caller).unwrap();
        assert_eq!(pipe.status().capacity, 8);
        drop(reader);
        assert_eq!(pipe.status().capacity, 8);
        writer.release();
        assert_eq!(pipe.status().capacity, 0);
    }
}
