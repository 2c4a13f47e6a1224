//! Diagnostic snapshot of a store's chain (occupancy only, never data)

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDump {
    pub index: usize,
    /// Allocated slot indexes; `None` if the node has no slot array yet
    pub slots: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreDump {
    pub name: String,
    pub quantum: usize,
    pub qset: usize,
    pub size: u64,
    pub nodes: Vec<NodeDump>,
}

impl StoreDump {
    /// Total allocated quanta across the chain
    #[must_use]
    pub fn quanta(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|n| n.slots.as_ref())
            .map(Vec::len)
            .sum()
    }
}

impl fmt::Display for StoreDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Device {}: qset {}, q {}, sz {}",
            self.name, self.qset, self.quantum, self.size
        )?;
        for node in &self.nodes {
            match &node.slots {
                None => writeln!(f, "  item {}: no data", node.index)?,
                Some(slots) => {
                    writeln!(f, "  item {}: {} of {} quanta", node.index, slots.len(), self.qset)?;
                    for slot in slots {
                        writeln!(f, "    {slot:4}: allocated")?;
                    }
                }
            }
        }
        Ok(())
    }
}
