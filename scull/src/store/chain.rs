//! Lazily-grown chain of quantum sets
//!
//! The chain is an index-addressed vector of nodes. Each node owns an
//! optional array of `qset` slots, each slot an optional quantum of
//! `quantum` bytes. Nothing is allocated until a write touches it, and
//! nothing is freed except by [`QuantumChain::clear`].
//!
//! The geometry is frozen when the first node is allocated, so later
//! configuration changes cannot misaddress data already stored.

use crate::error::{Result, ScullError};

/// Quantum size and quanta per node, fixed for the life of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub quantum: usize,
    pub qset: usize,
    span: u64,
}

/// Where a logical offset lives in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub node: usize,
    pub slot: usize,
    pub byte: usize,
}

impl Geometry {
    /// # Errors
    ///
    /// Returns `InvalidArgument` if either value is zero (a reset device) or
    /// the node span overflows.
    pub fn new(quantum: usize, qset: usize) -> Result<Self> {
        if quantum == 0 || qset == 0 {
            return Err(ScullError::invalid(format!(
                "device geometry unset (quantum {quantum}, qset {qset})"
            )));
        }
        let span = quantum
            .checked_mul(qset)
            .and_then(|s| u64::try_from(s).ok())
            .ok_or_else(|| ScullError::invalid("quantum * qset overflows"))?;
        Ok(Self { quantum, qset, span })
    }

    /// Bytes covered by one node
    #[must_use]
    pub fn node_span(&self) -> u64 {
        self.span
    }

    /// # Errors
    ///
    /// Returns `InvalidArgument` if the node index does not fit in `usize`.
    pub fn locate(&self, offset: u64) -> Result<Position> {
        let node = usize::try_from(offset / self.span)
            .map_err(|_| ScullError::invalid("offset beyond addressable range"))?;
        // rest < span, and span fits in usize
        let rest = usize::try_from(offset % self.span)
            .map_err(|_| ScullError::invalid("offset beyond addressable range"))?;
        Ok(Position {
            node,
            slot: rest / self.quantum,
            byte: rest % self.quantum,
        })
    }
}

type Quantum = Box<[u8]>;

#[derive(Default)]
struct Node {
    slots: Option<Vec<Option<Quantum>>>,
}

pub(crate) struct QuantumChain {
    geometry: Option<Geometry>,
    nodes: Vec<Node>,
}

impl QuantumChain {
    pub fn new() -> Self {
        Self {
            geometry: None,
            nodes: Vec::new(),
        }
    }

    /// Frozen geometry, `None` while nothing is allocated
    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    /// Number of allocated nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Look up the quantum at `pos` without allocating
    pub fn quantum(&self, pos: Position) -> Option<&[u8]> {
        self.nodes
            .get(pos.node)?
            .slots
            .as_ref()?
            .get(pos.slot)?
            .as_deref()
    }

    /// Look up the quantum at `pos`, allocating nodes, the slot array and
    /// the quantum itself as needed.
    ///
    /// On allocation failure whatever was grown so far stays in place.
    pub fn quantum_mut(&mut self, geometry: Geometry, pos: Position) -> Result<&mut [u8]> {
        let geometry = *self.geometry.get_or_insert(geometry);

        while self.nodes.len() <= pos.node {
            self.nodes
                .try_reserve(1)
                .map_err(|_| ScullError::OutOfMemory)?;
            self.nodes.push(Node::default());
            log::debug!("chain: allocated node {}", self.nodes.len() - 1);
        }
        let node = self
            .nodes
            .get_mut(pos.node)
            .ok_or(ScullError::OutOfMemory)?;

        if node.slots.is_none() {
            let mut slots = Vec::new();
            slots
                .try_reserve_exact(geometry.qset)
                .map_err(|_| ScullError::OutOfMemory)?;
            slots.resize_with(geometry.qset, || None);
            node.slots = Some(slots);
        }
        let slot = node
            .slots
            .as_mut()
            .and_then(|slots| slots.get_mut(pos.slot))
            .ok_or_else(|| ScullError::invalid("slot outside node"))?;

        if slot.is_none() {
            *slot = Some(alloc_quantum(geometry.quantum)?);
        }
        slot.as_deref_mut().ok_or(ScullError::OutOfMemory)
    }

    /// Free every quantum and node; the geometry is unfrozen
    pub fn clear(&mut self) {
        self.nodes = Vec::new();
        self.geometry = None;
    }

    /// Allocated slot indexes per node; `None` for a node without a slot array
    pub fn occupancy(&self) -> Vec<Option<Vec<usize>>> {
        self.nodes
            .iter()
            .map(|node| {
                node.slots.as_ref().map(|slots| {
                    slots
                        .iter()
                        .enumerate()
                        .filter_map(|(i, q)| q.as_ref().map(|_| i))
                        .collect()
                })
            })
            .collect()
    }
}

fn alloc_quantum(size: usize) -> Result<Quantum> {
    let mut data = Vec::new();
    data.try_reserve_exact(size)
        .map_err(|_| ScullError::OutOfMemory)?;
    data.resize(size, 0);
    Ok(data.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate() {
        let g = Geometry::new(4000, 500).unwrap();
        assert_eq!(g.node_span(), 2_000_000);
        let pos = g.locate(2 * 2_000_000 + 4000 * 7 + 13).unwrap();
        assert_eq!(pos, Position { node: 2, slot: 7, byte: 13 });
    }

    #[test]
    fn test_zero_geometry_rejected() {
        assert!(Geometry::new(0, 10).is_err());
        assert!(Geometry::new(10, 0).is_err());
    }

    #[test]
    fn test_lookup_never_allocates() {
        let chain = QuantumChain::new();
        let pos = Position { node: 3, slot: 0, byte: 0 };
        assert!(chain.quantum(pos).is_none());
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn test_grow_and_clear() {
        let mut chain = QuantumChain::new();
        let g = Geometry::new(8, 4).unwrap();
        let pos = g.locate(70).unwrap();
        chain.quantum_mut(g, pos).unwrap()[pos.byte] = 0xAA;

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.geometry(), Some(g));
        assert_eq!(chain.quantum(pos).unwrap()[pos.byte], 0xAA);
        // Intermediate nodes exist but have no slot array
        assert_eq!(chain.occupancy(), vec![None, None, Some(vec![0])]);

        chain.clear();
        assert_eq!(chain.len(), 0);
        assert_eq!(chain.geometry(), None);
    }

    #[test]
    fn test_geometry_frozen_on_first_growth() {
        let mut chain = QuantumChain::new();
        let first = Geometry::new(8, 4).unwrap();
        let other = Geometry::new(16, 2).unwrap();
        chain.quantum_mut(first, first.locate(0).unwrap()).unwrap();
        let q = chain.quantum_mut(other, first.locate(9).unwrap()).unwrap();
        assert_eq!(q.len(), 8);
        assert_eq!(chain.geometry(), Some(first));
    }
}
