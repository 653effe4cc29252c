//! Per-node remaining capacity.

use crate::quantity::Resources;
use crate::record::NodeRecord;
use std::ops::Range;

/// Remaining CPU and memory on one node.
pub type LedgerEntry = Resources;

/// Remaining capacity for every node of a run, aligned with the node list.
///
/// Entries only ever shrink. Unsigned magnitudes plus the guarded subtraction
/// in [`Ledger::try_allocate`] keep every entry non-negative.
#[derive(Debug, Clone)]
pub struct Ledger {
    capacity: Vec<Resources>,
    remaining: Vec<LedgerEntry>,
}

impl Ledger {
    /// Build a ledger from node capacities.
    pub fn initialize(nodes: &[NodeRecord]) -> Self {
        let capacity: Vec<Resources> = nodes.iter().map(|n| n.capacity).collect();
        Self {
            remaining: capacity.clone(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Remaining capacity at `index`.
    pub fn remaining(&self, index: usize) -> Option<LedgerEntry> {
        self.remaining.get(index).copied()
    }

    /// Original capacity at `index`.
    pub fn capacity(&self, index: usize) -> Option<Resources> {
        self.capacity.get(index).copied()
    }

    /// Deduct `request` from the entry at `index` if both dimensions fit.
    ///
    /// Leaves the ledger untouched and returns `false` otherwise, including
    /// for an out-of-range index.
    pub fn try_allocate(&mut self, index: usize, request: Resources) -> bool {
        let Some(entry) = self.remaining.get_mut(index) else {
            return false;
        };
        match (
            entry.cpu.checked_sub(request.cpu),
            entry.memory.checked_sub(request.memory),
        ) {
            (Some(cpu), Some(memory)) => {
                *entry = Resources::new(cpu, memory);
                true
            }
            _ => false,
        }
    }

    /// Allocate on the first node in `range` that fits `request`.
    pub fn first_fit(&mut self, range: Range<usize>, request: Resources) -> Option<usize> {
        let end = range.end.min(self.len());
        (range.start..end).find(|&index| self.try_allocate(index, request))
    }
}
