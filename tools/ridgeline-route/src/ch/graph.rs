//! Contraction hierarchy overlay: ranks, arcs and upward adjacency

use crate::search::StateId;
use crate::weighting::Weight;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcKind {
    /// One arc of the underlying state graph, labelled with the directed edge it walks
    Base { label: u32 },
    /// `skip1` (from → via) followed by `skip2` (via → to)
    Shortcut { skip1: u32, skip2: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChArc {
    pub from: StateId,
    pub to: StateId,
    pub weight: Weight,
    pub kind: ArcKind,
}

/// Read-only hierarchy shared by all queries of one profile
#[derive(Debug, Clone, PartialEq)]
pub struct ChGraph {
    pub(crate) profile: String,
    pub(crate) edge_based: bool,
    pub(crate) ranks: Vec<u32>,
    pub(crate) arcs: Vec<ChArc>,
    /// Arcs from a state to higher-ranked states, grouped by source
    pub(crate) up_offsets: Vec<u32>,
    pub(crate) up_arcs: Vec<u32>,
    /// Arcs into a state from higher-ranked states, grouped by target
    pub(crate) down_offsets: Vec<u32>,
    pub(crate) down_arcs: Vec<u32>,
}

fn csr(n: usize, lists: &[Vec<u32>]) -> (Vec<u32>, Vec<u32>) {
    let mut offsets = Vec::with_capacity(n + 1);
    let mut flat = Vec::with_capacity(lists.iter().map(Vec::len).sum());
    offsets.push(0);
    for list in lists {
        flat.extend_from_slice(list);
        offsets.push(flat.len() as u32);
    }
    (offsets, flat)
}

impl ChGraph {
    /// Assemble from per-state upward lists recorded during contraction.
    /// Arcs no list refers to (replaced by cheaper shortcuts) are dropped.
    pub(crate) fn assemble(
        profile: &str,
        edge_based: bool,
        ranks: Vec<u32>,
        arcs: &[ChArc],
        up: Vec<Vec<u32>>,
        down: Vec<Vec<u32>>,
    ) -> Self {
        let mut used: Vec<u32> = up.iter().chain(down.iter()).flatten().copied().collect();
        used.sort_unstable();
        used.dedup();
        // ascending ids keep every shortcut after the arcs it skips
        let mut remap = vec![u32::MAX; arcs.len()];
        let mut kept = Vec::with_capacity(used.len());
        for id in used {
            remap[id as usize] = kept.len() as u32;
            kept.push(arcs[id as usize]);
        }
        for arc in &mut kept {
            if let ArcKind::Shortcut { skip1, skip2 } = &mut arc.kind {
                *skip1 = remap[*skip1 as usize];
                *skip2 = remap[*skip2 as usize];
            }
        }
        let renumber = |lists: Vec<Vec<u32>>| -> Vec<Vec<u32>> {
            lists
                .into_iter()
                .map(|l| l.into_iter().map(|id| remap[id as usize]).collect())
                .collect()
        };
        let n = ranks.len();
        let (up_offsets, up_arcs) = csr(n, &renumber(up));
        let (down_offsets, down_arcs) = csr(n, &renumber(down));
        Self {
            profile: profile.to_string(),
            edge_based,
            ranks,
            arcs: kept,
            up_offsets,
            up_arcs,
            down_offsets,
            down_arcs,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn is_edge_based(&self) -> bool {
        self.edge_based
    }

    pub fn state_count(&self) -> usize {
        self.ranks.len()
    }

    pub fn rank(&self, state: StateId) -> Option<u32> {
        self.ranks.get(state as usize).copied()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn shortcut_count(&self) -> usize {
        self.arcs
            .iter()
            .filter(|a| matches!(a.kind, ArcKind::Shortcut { .. }))
            .count()
    }

    pub fn arc(&self, id: u32) -> &ChArc {
        &self.arcs[id as usize]
    }

    pub fn up(&self, state: StateId) -> impl Iterator<Item = u32> + '_ {
        let s = state as usize;
        self.up_arcs[self.up_offsets[s] as usize..self.up_offsets[s + 1] as usize]
            .iter()
            .copied()
    }

    pub fn down(&self, state: StateId) -> impl Iterator<Item = u32> + '_ {
        let s = state as usize;
        self.down_arcs[self.down_offsets[s] as usize..self.down_offsets[s + 1] as usize]
            .iter()
            .copied()
    }

    /// Directed edge labels an arc stands for, in travel order
    pub fn unpack(&self, arc: u32, out: &mut Vec<u32>) {
        let mut stack = vec![arc];
        while let Some(id) = stack.pop() {
            match self.arcs[id as usize].kind {
                ArcKind::Base { label } => out.push(label),
                ArcKind::Shortcut { skip1, skip2 } => {
                    stack.push(skip2);
                    stack.push(skip1);
                }
            }
        }
    }

    /// Structural checks run after loading from disk
    pub(crate) fn validate(&self) -> Result<(), String> {
        let n = self.ranks.len();
        let m = self.arcs.len() as u32;
        if self.up_offsets.len() != n + 1 || self.down_offsets.len() != n + 1 {
            return Err("adjacency offsets do not match state count".into());
        }
        if self.up_offsets.windows(2).any(|w| w[0] > w[1]) || self.down_offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err("adjacency offsets are not monotonic".into());
        }
        if self.up_offsets[n] as usize != self.up_arcs.len() || self.down_offsets[n] as usize != self.down_arcs.len() {
            return Err("adjacency offsets do not cover arc lists".into());
        }
        if self.up_arcs.iter().chain(&self.down_arcs).any(|&a| a >= m) {
            return Err("adjacency refers to a missing arc".into());
        }
        for (i, arc) in self.arcs.iter().enumerate() {
            if arc.from as usize >= n || arc.to as usize >= n {
                return Err(format!("arc {i} leaves the state range"));
            }
            if let ArcKind::Shortcut { skip1, skip2 } = arc.kind {
                if skip1 >= i as u32 || skip2 >= i as u32 {
                    return Err(format!("shortcut {i} skips an arc that does not precede it"));
                }
                let (a, b) = (self.arcs[skip1 as usize], self.arcs[skip2 as usize]);
                if a.from != arc.from || b.to != arc.to || a.to != b.from {
                    return Err(format!("shortcut {i} does not match the arcs it skips"));
                }
            }
        }
        Ok(())
    }
}
