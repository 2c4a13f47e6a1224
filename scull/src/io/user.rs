//! Caller-side buffers
//!
//! Device code never touches caller memory directly; it copies through
//! these traits, and a failed copy becomes `ScullError::BadAddress`. Plain
//! slices never fault. Other implementations (mapped regions, test
//! doubles) may.

/// A copy across the caller boundary failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault;

/// Caller memory the device reads from (the source of a write)
pub trait UserBuf {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the first `dst.len()` bytes into `dst`.
    ///
    /// Precondition: `dst.len() <= self.len()`.
    fn copy_out(&self, dst: &mut [u8]) -> Result<(), Fault>;
}

/// Caller memory the device writes into (the destination of a read)
pub trait UserBufMut {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill the first `src.len()` bytes from `src`.
    ///
    /// Precondition: `src.len() <= self.len()`.
    fn copy_in(&mut self, src: &[u8]) -> Result<(), Fault>;
}

impl UserBuf for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_out(&self, dst: &mut [u8]) -> Result<(), Fault> {
        let src = self.get(..dst.len()).ok_or(Fault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl UserBufMut for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_in(&mut self, src: &[u8]) -> Result<(), Fault> {
        let dst = self.get_mut(..src.len()).ok_or(Fault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl UserBuf for Vec<u8> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn copy_out(&self, dst: &mut [u8]) -> Result<(), Fault> {
        self.as_slice().copy_out(dst)
    }
}

impl UserBufMut for Vec<u8> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn copy_in(&mut self, src: &[u8]) -> Result<(), Fault> {
        self.as_mut_slice().copy_in(src)
    }
}

impl<const N: usize> UserBuf for [u8; N] {
    fn len(&self) -> usize {
        N
    }

    fn copy_out(&self, dst: &mut [u8]) -> Result<(), Fault> {
        self.as_slice().copy_out(dst)
    }
}

impl<const N: usize> UserBufMut for [u8; N] {
    fn len(&self) -> usize {
        N
    }

    fn copy_in(&mut self, src: &[u8]) -> Result<(), Fault> {
        self.as_mut_slice().copy_in(src)
    }
}
