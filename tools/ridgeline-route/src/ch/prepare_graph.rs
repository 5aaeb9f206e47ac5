//! Mutable graph used during contraction, plus the witness search
//!
//! Arcs live in one table; every uncontracted node keeps the ids of its
//! incoming and outgoing arcs to other uncontracted nodes. Contracting a node
//! snapshots those lists (they become its upward arcs in the hierarchy) and
//! unlinks the node from its neighbors.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use super::graph::{ArcKind, ChArc};
use crate::search::{StateGraph, StateId};
use crate::weighting::{Weight, WEIGHT_INFINITY};

pub(crate) struct PrepareGraph {
    pub arcs: Vec<ChArc>,
    /// Number of original arcs each arc stands for
    pub orig_count: Vec<u32>,
    pub out: Vec<Vec<u32>>,
    pub inc: Vec<Vec<u32>>,
    pub contracted: Vec<bool>,
    pub level: Vec<u32>,
    pub contracted_neighbors: Vec<u32>,
}

/// Outcome of (simulated) contraction of one node
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContractionStats {
    pub shortcuts: usize,
    pub removed: usize,
    pub original_edges: usize,
}

impl PrepareGraph {
    /// Copy the state graph's arcs, keeping the cheapest of parallel arcs and
    /// dropping loops
    pub fn from_states<G: StateGraph + ?Sized>(states: &G) -> Self {
        let n = states.state_count();
        let mut best: FxHashMap<(StateId, StateId), (Weight, u32)> = FxHashMap::default();
        for s in 0..n as StateId {
            states.for_each_arc(s, &mut |to, weight, label| {
                if to == s || weight == WEIGHT_INFINITY {
                    return;
                }
                let slot = best.entry((s, to)).or_insert((weight, label));
                if weight < slot.0 {
                    *slot = (weight, label);
                }
            });
        }

        let mut keyed: Vec<_> = best.into_iter().collect();
        keyed.sort_unstable_by_key(|&(k, _)| k);

        let mut graph = Self {
            arcs: Vec::with_capacity(keyed.len()),
            orig_count: Vec::with_capacity(keyed.len()),
            out: vec![Vec::new(); n],
            inc: vec![Vec::new(); n],
            contracted: vec![false; n],
            level: vec![0; n],
            contracted_neighbors: vec![0; n],
        };
        for ((from, to), (weight, label)) in keyed {
            graph.push_arc(
                ChArc {
                    from,
                    to,
                    weight,
                    kind: ArcKind::Base { label },
                },
                1,
            );
        }
        graph
    }

    pub fn node_count(&self) -> usize {
        self.out.len()
    }

    fn push_arc(&mut self, arc: ChArc, orig: u32) -> u32 {
        let id = self.arcs.len() as u32;
        self.out[arc.from as usize].push(id);
        self.inc[arc.to as usize].push(id);
        self.arcs.push(arc);
        self.orig_count.push(orig);
        id
    }

    /// Shortcuts contracting `v` would need, without changing the graph
    pub fn simulate(&self, v: StateId, witness: &mut WitnessSearch, max_settled: usize) -> ContractionStats {
        let mut stats = ContractionStats {
            removed: self.inc[v as usize].len() + self.out[v as usize].len(),
            ..Default::default()
        };
        self.for_each_needed_shortcut(v, witness, max_settled, |_, _, _, in_arc, out_arc| {
            stats.shortcuts += 1;
            stats.original_edges +=
                (self.orig_count[in_arc as usize] + self.orig_count[out_arc as usize]) as usize;
        });
        stats
    }

    fn for_each_needed_shortcut(
        &self,
        v: StateId,
        witness: &mut WitnessSearch,
        max_settled: usize,
        mut f: impl FnMut(StateId, StateId, Weight, u32, u32),
    ) {
        let outs = &self.out[v as usize];
        if outs.is_empty() {
            return;
        }
        let max_out = outs.iter().map(|&a| self.arcs[a as usize].weight).max().unwrap_or(0);
        for &in_arc in &self.inc[v as usize] {
            let a = self.arcs[in_arc as usize];
            let u = a.from;
            let targets: Vec<StateId> = outs
                .iter()
                .map(|&o| self.arcs[o as usize].to)
                .filter(|&w| w != u)
                .collect();
            if targets.is_empty() {
                continue;
            }
            witness.run(self, u, v, &targets, a.weight.saturating_add(max_out), max_settled);
            for &out_arc in outs {
                let b = self.arcs[out_arc as usize];
                if b.to == u {
                    continue;
                }
                let via = a.weight.saturating_add(b.weight);
                if witness.distance(b.to) > via {
                    f(u, b.to, via, in_arc, out_arc);
                }
            }
        }
    }

    /// Contract `v`: add the needed shortcuts and unlink it. Returns the
    /// arcs that become its upward arcs (outgoing, incoming) and the
    /// number of shortcuts added.
    pub fn contract(
        &mut self,
        v: StateId,
        witness: &mut WitnessSearch,
        max_settled: usize,
    ) -> (Vec<u32>, Vec<u32>, usize) {
        let mut needed = Vec::new();
        self.for_each_needed_shortcut(v, witness, max_settled, |u, w, via, a, b| {
            needed.push((u, w, via, a, b));
        });

        let mut added = 0;
        for (u, w, via, skip1, skip2) in needed {
            let orig = self.orig_count[skip1 as usize] + self.orig_count[skip2 as usize];
            let shortcut = ChArc {
                from: u,
                to: w,
                weight: via,
                kind: ArcKind::Shortcut { skip1, skip2 },
            };
            let existing = self.out[u as usize]
                .iter()
                .position(|&id| self.arcs[id as usize].to == w);
            match existing {
                Some(pos) => {
                    let old = self.out[u as usize][pos];
                    if self.arcs[old as usize].weight <= via {
                        continue;
                    }
                    let id = self.arcs.len() as u32;
                    self.arcs.push(shortcut);
                    self.orig_count.push(orig);
                    self.out[u as usize][pos] = id;
                    if let Some(slot) = self.inc[w as usize].iter_mut().find(|id| **id == old) {
                        *slot = id;
                    }
                }
                None => {
                    self.push_arc(shortcut, orig);
                }
            }
            added += 1;
        }

        let outs = std::mem::take(&mut self.out[v as usize]);
        let ins = std::mem::take(&mut self.inc[v as usize]);
        for &id in &ins {
            let u = self.arcs[id as usize].from as usize;
            self.out[u].retain(|&x| x != id);
        }
        for &id in &outs {
            let w = self.arcs[id as usize].to as usize;
            self.inc[w].retain(|&x| x != id);
        }
        self.contracted[v as usize] = true;
        (outs, ins, added)
    }

    /// Uncontracted neighbors of `v`, deduplicated
    pub fn neighbors(&self, v: StateId) -> Vec<StateId> {
        let mut n: Vec<StateId> = self.out[v as usize]
            .iter()
            .map(|&a| self.arcs[a as usize].to)
            .chain(self.inc[v as usize].iter().map(|&a| self.arcs[a as usize].from))
            .collect();
        n.sort_unstable();
        n.dedup();
        n
    }
}

/// Bounded Dijkstra that looks for paths avoiding the node being contracted.
/// Buffers are reused between runs via version stamps.
pub(crate) struct WitnessSearch {
    dist: Vec<Weight>,
    stamp: Vec<u32>,
    version: u32,
    heap: BinaryHeap<Reverse<(Weight, StateId)>>,
}

impl WitnessSearch {
    pub fn new(node_count: usize) -> Self {
        Self {
            dist: vec![WEIGHT_INFINITY; node_count],
            stamp: vec![0; node_count],
            version: 0,
            heap: BinaryHeap::new(),
        }
    }

    fn next_version(&mut self) {
        self.version = self.version.wrapping_add(1);
        if self.version == 0 {
            self.stamp.fill(0);
            self.version = 1;
        }
    }

    pub fn distance(&self, node: StateId) -> Weight {
        if self.stamp[node as usize] == self.version {
            self.dist[node as usize]
        } else {
            WEIGHT_INFINITY
        }
    }

    fn set(&mut self, node: StateId, w: Weight) {
        self.stamp[node as usize] = self.version;
        self.dist[node as usize] = w;
    }

    pub fn run(
        &mut self,
        graph: &PrepareGraph,
        source: StateId,
        avoid: StateId,
        targets: &[StateId],
        max_weight: Weight,
        max_settled: usize,
    ) {
        self.next_version();
        self.heap.clear();
        self.set(source, 0);
        self.heap.push(Reverse((0, source)));

        let mut settled = 0usize;
        let mut open_targets = targets.len();
        while let Some(Reverse((d, u))) = self.heap.pop() {
            if d > self.distance(u) {
                continue;
            }
            if d > max_weight || settled >= max_settled {
                break;
            }
            settled += 1;
            if targets.contains(&u) {
                open_targets -= 1;
                if open_targets == 0 {
                    break;
                }
            }
            for &id in &graph.out[u as usize] {
                let arc = graph.arcs[id as usize];
                if arc.to == avoid {
                    continue;
                }
                let nd = d.saturating_add(arc.weight);
                if nd < self.distance(arc.to) {
                    self.set(arc.to, nd);
                    self.heap.push(Reverse((nd, arc.to)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bidirectional path a - v - b plus a detour a - x - b of weight `detour`
    fn star(detour: Weight) -> PrepareGraph {
        struct G(Vec<Vec<(StateId, Weight)>>);
        impl StateGraph for G {
            fn state_count(&self) -> usize {
                self.0.len()
            }
            fn node_of(&self, s: StateId) -> u32 {
                s
            }
            fn for_each_arc(&self, s: StateId, f: &mut dyn FnMut(StateId, Weight, u32)) {
                for &(t, w) in &self.0[s as usize] {
                    f(t, w, s * 10 + t);
                }
            }
        }
        // 0 = a, 1 = v, 2 = b, 3 = x
        let half = detour / 2;
        PrepareGraph::from_states(&G(vec![
            vec![(1, 1), (3, half)],
            vec![(0, 1), (2, 1)],
            vec![(1, 1), (3, half)],
            vec![(0, half), (2, half)],
        ]))
    }

    #[test]
    fn test_shortcut_needed_without_witness() {
        let mut g = star(10);
        let mut ws = WitnessSearch::new(g.node_count());
        let stats = g.simulate(1, &mut ws, 100);
        assert_eq!(stats.shortcuts, 2); // a->b and b->a
        assert_eq!(stats.removed, 4);

        let (ups, downs, added) = g.contract(1, &mut ws, 100);
        assert_eq!((ups.len(), downs.len(), added), (2, 2, 2));
        let sc = g.out[0].iter().map(|&a| g.arcs[a as usize]).find(|a| a.to == 2).unwrap();
        assert_eq!(sc.weight, 2);
        assert!(matches!(sc.kind, ArcKind::Shortcut { .. }));
        assert!(g.neighbors(0).iter().all(|&n| n != 1));
    }

    #[test]
    fn test_witness_prevents_shortcut() {
        let g = star(2);
        let mut ws = WitnessSearch::new(g.node_count());
        assert_eq!(g.simulate(1, &mut ws, 100).shortcuts, 0);
    }
}
