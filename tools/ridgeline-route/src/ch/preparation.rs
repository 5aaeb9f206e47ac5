//! Node ordering and contraction
//!
//! States are contracted one at a time in priority order. The priority mixes
//! edge difference, original edge count, contracted neighbors and level with
//! the configured coefficients. Priorities are refreshed lazily on pop, for
//! neighbors of each contracted state, and periodically for every remaining
//! state. The periodic refresh runs in parallel with one witness search per
//! worker thread; contraction itself stays single-writer.

use std::cmp::Reverse;
use std::time::Instant;

use priority_queue::PriorityQueue;
use rayon::prelude::*;
use ridgeline_common::{ConfigError, Result};
use tracing::{debug, info};

use super::graph::ChGraph;
use super::prepare_graph::{PrepareGraph, WitnessSearch};
use crate::config::ChParams;
use crate::search::{StateGraph, StateId};

type Queue = PriorityQueue<StateId, Reverse<(i64, StateId)>>;

pub struct ChPreparation<'a> {
    profile: &'a str,
    params: &'a ChParams,
}

impl<'a> ChPreparation<'a> {
    pub fn new(profile: &'a str, params: &'a ChParams) -> Self {
        Self { profile, params }
    }

    fn priority(&self, graph: &PrepareGraph, witness: &mut WitnessSearch, v: StateId) -> i64 {
        let p = self.params;
        let stats = graph.simulate(v, witness, p.witness_max_settled);
        let edge_difference = stats.shortcuts as f64 - stats.removed as f64;
        let value = p.edge_difference_weight * edge_difference
            + p.original_edges_weight * stats.original_edges as f64
            + p.contracted_neighbors_weight * graph.contracted_neighbors[v as usize] as f64
            + p.level_weight * graph.level[v as usize] as f64;
        // coefficients may be fractional; keep three decimals in the integer key
        (value * 1000.0).round() as i64
    }

    fn recompute_all(&self, graph: &PrepareGraph) -> Queue {
        let n = graph.node_count();
        let priorities: Vec<(StateId, i64)> = (0..n as StateId)
            .into_par_iter()
            .filter(|&v| !graph.contracted[v as usize])
            .map_init(
                || WitnessSearch::new(n),
                |witness, v| (v, self.priority(graph, witness, v)),
            )
            .collect();
        let mut queue = Queue::with_capacity(priorities.len());
        for (v, p) in priorities {
            queue.push(v, Reverse((p, v)));
        }
        queue
    }

    /// Contract every state of `states` and build the hierarchy
    pub fn run<G: StateGraph + Sync + ?Sized>(&self, states: &G, edge_based: bool) -> Result<ChGraph> {
        match self.params.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| ConfigError::InvalidParameter {
                        key: "ch.params.threads".to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(pool.install(|| self.contract_all(states, edge_based)))
            }
            None => Ok(self.contract_all(states, edge_based)),
        }
    }

    fn contract_all<G: StateGraph + ?Sized>(&self, states: &G, edge_based: bool) -> ChGraph {
        let start = Instant::now();
        let params = self.params;
        let mut graph = PrepareGraph::from_states(states);
        let n = graph.node_count();
        info!(
            profile = self.profile,
            edge_based,
            states = n,
            arcs = graph.arcs.len(),
            "contracting"
        );

        let mut up: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut down: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut ranks = vec![0u32; n];
        let mut witness = WitnessSearch::new(n);
        let mut queue = self.recompute_all(&graph);

        let period = if params.periodic_updates == 0 {
            usize::MAX
        } else {
            (n * params.periodic_updates as usize / 100).max(1)
        };
        let mut since_update = 0usize;
        let mut next_rank = 0u32;
        let mut shortcuts = 0usize;

        while let Some((v, Reverse((_, _)))) = queue.pop() {
            if params.lazy_updates {
                let fresh = self.priority(&graph, &mut witness, v);
                if let Some((_, Reverse((next, _)))) = queue.peek() {
                    if fresh > *next {
                        queue.push(v, Reverse((fresh, v)));
                        continue;
                    }
                }
            }

            let neighbors = graph.neighbors(v);
            let (outs, ins, added) = graph.contract(v, &mut witness, params.witness_max_settled);
            shortcuts += added;
            up[v as usize] = outs;
            down[v as usize] = ins;
            ranks[v as usize] = next_rank;
            next_rank += 1;

            let level = graph.level[v as usize] + 1;
            for &u in &neighbors {
                graph.contracted_neighbors[u as usize] += 1;
                graph.level[u as usize] = graph.level[u as usize].max(level);
            }

            since_update += 1;
            if since_update >= period && !queue.is_empty() {
                since_update = 0;
                debug!(contracted = next_rank, remaining = queue.len(), "periodic priority update");
                queue = self.recompute_all(&graph);
            } else if params.neighbor_updates {
                for &u in &neighbors {
                    let p = self.priority(&graph, &mut witness, u);
                    queue.change_priority(&u, Reverse((p, u)));
                }
            }

            if next_rank as usize % 100_000 == 0 {
                debug!(contracted = next_rank, shortcuts, "contraction progress");
            }
        }

        let ch = ChGraph::assemble(self.profile, edge_based, ranks, &graph.arcs, up, down);
        info!(
            profile = self.profile,
            shortcuts = ch.shortcut_count(),
            arcs = ch.arc_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "contraction hierarchy ready"
        );
        ch
    }
}
