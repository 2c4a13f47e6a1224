//! Quantum-set storage engine
//!
//! A [`Store`] maps a flat logical offset space onto a [`chain`] of
//! fixed-size quanta. Every operation runs under the store's sleeping
//! lock. Reads and writes never cross a quantum boundary: a request that
//! spans several quanta is served partially, and callers loop (see
//! [`StoreFile::read_all`] and [`StoreFile::write_all`]).
//!
//! Unwritten regions ("holes") read as end-of-data, not as zeros.

pub mod chain;
pub mod dump;
pub mod file;

pub use chain::{Geometry, Position};
pub use dump::{NodeDump, StoreDump};
pub use file::StoreFile;

use std::fmt;

use crate::caller::Caller;
use crate::config::ScullConfig;
use crate::error::{Result, ScullError};
use crate::io::{UserBuf, UserBufMut};
use crate::sync::SleepLock;
use chain::QuantumChain;

struct StoreState {
    /// Configured quantum, applied at the next chain growth
    quantum: usize,
    /// Configured qset, applied at the next chain growth
    qset: usize,
    chain: QuantumChain,
    /// High-water mark of written bytes
    size: u64,
}

/// Byte-addressable in-memory device
pub struct Store {
    state: SleepLock<StoreState>,
    name: String,
}

impl Store {
    #[must_use]
    pub fn new(name: &str, config: &ScullConfig) -> Self {
        Self::with_geometry(name, config.quantum, config.qset)
    }

    #[must_use]
    pub fn with_geometry(name: &str, quantum: usize, qset: usize) -> Self {
        Self {
            state: SleepLock::new(StoreState {
                quantum,
                qset,
                chain: QuantumChain::new(),
                size: 0,
            }),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read at most `buf.len()` bytes at `offset`, never past the end of
    /// the quantum holding `offset`.
    ///
    /// Returns 0 at or past the end of data, and for holes.
    ///
    /// # Errors
    ///
    /// - `Interrupted` if the lock wait was interrupted (nothing was read)
    /// - `BadAddress` if copying into `buf` failed
    pub fn read<B: UserBufMut + ?Sized>(
        &self,
        offset: u64,
        buf: &mut B,
        caller: &Caller,
    ) -> Result<usize> {
        let state = self.state.lock_interruptible(&caller.interrupt)?;

        if offset >= state.size {
            return Ok(0);
        }
        let count = buf
            .len()
            .min(usize::try_from(state.size - offset).unwrap_or(usize::MAX));

        let Some(geometry) = state.chain.geometry() else {
            return Ok(0);
        };
        let pos = geometry.locate(offset)?;
        let Some(quantum) = state.chain.quantum(pos) else {
            return Ok(0);
        };

        let count = count.min(geometry.quantum - pos.byte);
        buf.copy_in(&quantum[pos.byte..pos.byte + count])
            .map_err(|_| ScullError::BadAddress)?;
        Ok(count)
    }

    /// Write at most `buf.len()` bytes at `offset`, never past the end of
    /// the quantum holding `offset`. Grows the chain as needed.
    ///
    /// # Errors
    ///
    /// - `Interrupted` if the lock wait was interrupted (nothing changed)
    /// - `OutOfMemory` if growth failed; nodes allocated so far are kept
    /// - `InvalidArgument` if the store's quantum or qset is zero
    /// - `BadAddress` if copying from `buf` failed; the size is unchanged
    pub fn write<B: UserBuf + ?Sized>(&self, offset: u64, buf: &B, caller: &Caller) -> Result<usize> {
        let mut guard = self.state.lock_interruptible(&caller.interrupt)?;
        let state = &mut *guard;

        if buf.is_empty() {
            return Ok(0);
        }
        let geometry = match state.chain.geometry() {
            Some(frozen) => frozen,
            None => Geometry::new(state.quantum, state.qset)?,
        };
        let pos = geometry.locate(offset)?;
        let count = buf.len().min(geometry.quantum - pos.byte);
        let end = u64::try_from(count)
            .ok()
            .and_then(|c| offset.checked_add(c))
            .ok_or_else(|| ScullError::invalid("write past the end of the offset space"))?;

        let quantum = state.chain.quantum_mut(geometry, pos)?;
        buf.copy_out(&mut quantum[pos.byte..pos.byte + count])
            .map_err(|_| ScullError::BadAddress)?;

        state.size = state.size.max(end);
        Ok(count)
    }

    /// Free the whole chain and reset the size. The configured quantum and
    /// qset are kept for the next growth.
    ///
    /// # Errors
    ///
    /// `Interrupted` if the lock wait was interrupted.
    pub fn trim(&self, caller: &Caller) -> Result<()> {
        let mut state = self.state.lock_interruptible(&caller.interrupt)?;
        Self::trim_state(&self.name, &mut state);
        Ok(())
    }

    /// Uninterruptible trim for teardown
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        Self::trim_state(&self.name, &mut state);
    }

    fn trim_state(name: &str, state: &mut StoreState) {
        log::debug!(
            "{name}: trim ({} nodes, {} bytes)",
            state.chain.len(),
            state.size
        );
        state.chain.clear();
        state.size = 0;
    }

    /// Logical size in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    /// Configured quantum (used at the next growth)
    #[must_use]
    pub fn quantum(&self) -> usize {
        self.state.lock().quantum
    }

    /// Configured qset (used at the next growth)
    #[must_use]
    pub fn qset(&self) -> usize {
        self.state.lock().qset
    }

    pub(crate) fn set_quantum(&self, quantum: usize) -> usize {
        std::mem::replace(&mut self.state.lock().quantum, quantum)
    }

    pub(crate) fn set_qset(&self, qset: usize) -> usize {
        std::mem::replace(&mut self.state.lock().qset, qset)
    }

    /// Geometry frozen into the current chain, if any
    #[must_use]
    pub fn geometry(&self) -> Option<Geometry> {
        self.state.lock().chain.geometry()
    }

    /// Number of nodes in the chain
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.lock().chain.len()
    }

    /// Copy of the quantum at (`node`, `slot`), if allocated
    #[must_use]
    pub fn peek(&self, node: usize, slot: usize) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .chain
            .quantum(Position { node, slot, byte: 0 })
            .map(<[u8]>::to_vec)
    }

    /// Occupancy snapshot, serialized with writers by the store lock
    ///
    /// # Errors
    ///
    /// `Interrupted` if the lock wait was interrupted.
    pub fn dump(&self, caller: &Caller) -> Result<StoreDump> {
        let state = self.state.lock_interruptible(&caller.interrupt)?;
        let geometry = state.chain.geometry();
        Ok(StoreDump {
            name: self.name.clone(),
            quantum: geometry.map_or(state.quantum, |g| g.quantum),
            qset: geometry.map_or(state.qset, |g| g.qset),
            size: state.size,
            nodes: state
                .chain
                .occupancy()
                .into_iter()
                .enumerate()
                .map(|(index, slots)| NodeDump { index, slots })
                .collect(),
        })
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "Store(name={}, quantum={}, qset={}, size={}, nodes={})",
            self.name,
            state.quantum,
            state.qset,
            state.size,
            state.chain.len()
        )
    }
}
