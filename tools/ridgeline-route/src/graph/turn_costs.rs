//! Explicit turn costs recorded at import time
//!
//! An entry applies to one vehicle and one (from_edge, via_node, to_edge) triple.
//! `f64::INFINITY` marks a forbidden turn. Missing entries cost nothing; u-turn
//! costs are not stored here, they belong to the weighting.

use rustc_hash::FxHashMap;

use super::encoding::VehicleSlot;
use super::{EdgeId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnKey {
    pub vehicle: u8,
    pub from_edge: EdgeId,
    pub via_node: NodeId,
    pub to_edge: EdgeId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnCostTable {
    entries: FxHashMap<TurnKey, f32>,
}

impl TurnCostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TurnKey, cost: f64) {
        self.entries.insert(key, cost as f32);
    }

    pub fn get(
        &self,
        slot: VehicleSlot,
        from_edge: EdgeId,
        via_node: NodeId,
        to_edge: EdgeId,
    ) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        self.entries
            .get(&TurnKey {
                vehicle: slot.index() as u8,
                from_edge,
                via_node,
                to_edge,
            })
            .map(|&c| c as f64)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order, for deterministic persistence
    pub fn sorted_entries(&self) -> Vec<(TurnKey, f32)> {
        let mut out: Vec<_> = self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        out.sort_by_key(|(k, _)| *k);
        out
    }

    /// Rewrite via nodes after a node renumbering (`map[old] = new`)
    pub fn remap_nodes(&mut self, map: &[NodeId]) {
        self.entries = self
            .entries
            .drain()
            .map(|(mut k, v)| {
                k.via_node = map[k.via_node as usize];
                (k, v)
            })
            .collect();
    }
}
