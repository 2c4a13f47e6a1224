//! Open handle on a store: a position plus the flags it was opened with

use std::fmt;
use std::io::{self, SeekFrom};
use std::sync::Arc;

use super::Store;
use crate::access::Admission;
use crate::caller::Caller;
use crate::error::{Result, ScullError};
use crate::io::{AccessMode, OpenFlags, UserBuf, UserBufMut};

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// Positioned handle on a [`Store`]
///
/// Each call to [`StoreFile::read`] or [`StoreFile::write`] is one partial
/// transfer; use the `_all` helpers to loop.
///
/// A handle opened through an access policy holds its admission and gives
/// it back when released or dropped.
pub struct StoreFile {
    store: Arc<Store>,
    pos: u64,
    flags: OpenFlags,
    caller: Caller,
    admission: Option<Admission>,
}

impl StoreFile {
    /// Open `store`; a write-only open truncates it.
    ///
    /// # Errors
    ///
    /// `Interrupted` if the truncating trim was interrupted.
    pub fn open(store: Arc<Store>, flags: OpenFlags, caller: &Caller) -> Result<Self> {
        if flags.access == AccessMode::WriteOnly {
            store.trim(caller)?;
        }
        Ok(Self {
            store,
            pos: 0,
            flags,
            caller: caller.clone(),
            admission: None,
        })
    }

    pub(crate) fn with_admission(mut self, admission: Admission) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Whether the handle holds a policy admission
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        self.admission.is_some()
    }

    /// Close the handle; equivalent to dropping it
    pub fn release(self) {
        drop(self);
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    #[must_use]
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[must_use]
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// One partial read at the current position
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on a write-only handle, otherwise as [`Store::read`].
    pub fn read<B: UserBufMut + ?Sized>(&mut self, buf: &mut B) -> Result<usize> {
        if !self.flags.access.readable() {
            return Err(ScullError::invalid("handle not open for reading"));
        }
        let n = self.store.read(self.pos, buf, &self.caller)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// One partial write at the current position
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on a read-only handle, otherwise as [`Store::write`].
    pub fn write<B: UserBuf + ?Sized>(&mut self, buf: &B) -> Result<usize> {
        if !self.flags.access.writable() {
            return Err(ScullError::invalid("handle not open for writing"));
        }
        let n = self.store.write(self.pos, buf, &self.caller)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Read until `buf` is full or the store returns 0 (end of data or a hole)
    ///
    /// # Errors
    ///
    /// The first error from [`StoreFile::read`]; bytes already read stay consumed.
    pub fn read_all(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.read(&mut buf[done..])?;
            if n == 0 {
                break;
            }
            done += n;
        }
        Ok(done)
    }

    /// Write the whole of `buf`, one quantum at a time
    ///
    /// # Errors
    ///
    /// The first error from [`StoreFile::write`].
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            done += self.write(&buf[done..])?;
        }
        Ok(())
    }

    /// Reposition the handle. `End` is relative to the store's logical size.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the resulting position would be negative or overflow.
    pub fn seek(&mut self, target: SeekFrom) -> Result<u64> {
        let (base, off) = match target {
            SeekFrom::Start(off) => (0i128, i128::from(off)),
            SeekFrom::Current(off) => (i128::from(self.pos), i128::from(off)),
            SeekFrom::End(off) => (i128::from(self.store.size()), i128::from(off)),
        };
        let newpos = u64::try_from(base + off)
            .map_err(|_| ScullError::invalid(format!("seek to {}", base + off)))?;
        self.pos = newpos;
        Ok(newpos)
    }

    /// Seek with a raw `whence` code (`SEEK_SET`, `SEEK_CUR`, `SEEK_END`)
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown `whence` or a negative result.
    pub fn llseek(&mut self, off: i64, whence: i32) -> Result<u64> {
        let target = match whence {
            SEEK_SET => SeekFrom::Start(
                u64::try_from(off).map_err(|_| ScullError::invalid(format!("seek to {off}")))?,
            ),
            SEEK_CUR => SeekFrom::Current(off),
            SEEK_END => SeekFrom::End(off),
            _ => return Err(ScullError::invalid(format!("bad seek origin {whence}"))),
        };
        self.seek(target)
    }
}

impl fmt::Debug for StoreFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreFile(store={}, pos={}, flags={:?}, admitted={})",
            self.store.name(),
            self.pos,
            self.flags,
            self.is_admitted()
        )
    }
}

impl io::Read for StoreFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        StoreFile::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for StoreFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        StoreFile::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for StoreFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        StoreFile::seek(self, pos).map_err(io::Error::from)
    }
}

impl embedded_io::ErrorType for StoreFile {
    type Error = ScullError;
}

impl embedded_io::Read for StoreFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        StoreFile::read(self, buf)
    }
}

impl embedded_io::Write for StoreFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        StoreFile::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl embedded_io::Seek for StoreFile {
    fn seek(&mut self, pos: embedded_io::SeekFrom) -> Result<u64> {
        let pos = match pos {
            embedded_io::SeekFrom::Start(off) => SeekFrom::Start(off),
            embedded_io::SeekFrom::End(off) => SeekFrom::End(off),
            embedded_io::SeekFrom::Current(off) => SeekFrom::Current(off),
        };
        StoreFile::seek(self, pos)
    }
}
