//! Landmark selection and distance tables
//!
//! Landmarks are picked per subnetwork, farthest-first: starting from a
//! seeded random node (or a supplied start node), repeatedly take the node
//! farthest from every landmark chosen so far. Each landmark then gets one
//! forward and one backward shortest path tree; trees are independent and
//! run in parallel.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use ridgeline_common::{ConfigError, Result};
use tracing::{info, warn};

use super::storage::{quantize, LandmarkStorage, INFINITE, MAX_QUANTIZED, NO_SUBNETWORK, SATURATED};
use super::subnetworks::{find_subnetworks, RegionLookup};
use crate::config::LmSection;
use crate::graph::{NodeId, RoutingGraph};
use crate::search::{shortest_path_tree, NodeBasedGraph, StateGraph, StateId};
use crate::weighting::{edge_weight, to_weight, Weight, Weighting, WEIGHT_INFINITY};

/// Both directions of every usable edge, at the cheaper of the two weights.
/// Only used to spread landmarks out.
struct Undirected<'a> {
    graph: &'a RoutingGraph,
    weighting: &'a dyn Weighting,
}

impl StateGraph for Undirected<'_> {
    fn state_count(&self) -> usize {
        self.graph.node_count()
    }

    fn node_of(&self, state: StateId) -> NodeId {
        state
    }

    fn for_each_arc(&self, state: StateId, f: &mut dyn FnMut(StateId, Weight, u32)) {
        for cursor in self.graph.edges(state) {
            let w = edge_weight(self.weighting, self.graph, cursor.edge, false)
                .min(edge_weight(self.weighting, self.graph, cursor.edge, true));
            if w != WEIGHT_INFINITY && cursor.adj != state {
                f(cursor.adj, w, cursor.edge);
            }
        }
    }
}

pub struct LandmarkPreparation<'a> {
    profile: &'a str,
    graph: &'a RoutingGraph,
    weighting: &'a dyn Weighting,
    section: &'a LmSection,
    maximum_weight: Option<f64>,
    regions: Option<&'a dyn RegionLookup>,
    start_node: Option<NodeId>,
}

impl<'a> LandmarkPreparation<'a> {
    pub fn new(
        profile: &'a str,
        graph: &'a RoutingGraph,
        weighting: &'a dyn Weighting,
        section: &'a LmSection,
    ) -> Self {
        Self {
            profile,
            graph,
            weighting,
            section,
            maximum_weight: None,
            regions: None,
            start_node: None,
        }
    }

    /// Fix the quantization range instead of deriving it from the tables
    pub fn with_maximum_weight(mut self, maximum_weight: Option<f64>) -> Self {
        self.maximum_weight = maximum_weight;
        self
    }

    /// Keep landmark trees from crossing region boundaries
    pub fn with_regions(mut self, regions: &'a dyn RegionLookup) -> Self {
        self.regions = Some(regions);
        self
    }

    /// Start the farthest-first selection here instead of at a random node
    pub fn with_start_node(mut self, node: NodeId) -> Self {
        self.start_node = Some(node);
        self
    }

    pub fn run(&self) -> Result<LandmarkStorage> {
        self.weighting.validate(self.graph)?;
        if self.weighting.has_turn_costs() {
            return Err(ConfigError::WeightingUnavailable {
                weighting: self.weighting.name().to_string(),
                reason: "landmark distances must be computed without turn costs".to_string(),
            }
            .into());
        }
        match self.section.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| ConfigError::InvalidParameter {
                        key: "lm.threads".to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(pool.install(|| self.prepare()))
            }
            None => Ok(self.prepare()),
        }
    }

    fn select(&self, subnetworks: &[u32], members: &[NodeId], subnetwork: u32) -> Vec<NodeId> {
        let count = self.section.landmarks.min(members.len());
        let undirected = Undirected {
            graph: self.graph,
            weighting: self.weighting,
        };
        let inside = |v: StateId| subnetworks[v as usize] == subnetwork;

        let start = match self.start_node {
            Some(s) if (s as usize) < subnetworks.len() && inside(s) => s,
            _ => {
                let mut rng = StdRng::seed_from_u64(self.section.random_seed.wrapping_add(subnetwork as u64));
                members[rng.random_range(0..members.len())]
            }
        };

        let mut chosen: Vec<NodeId> = Vec::with_capacity(count);
        let mut from: Vec<NodeId> = vec![start];
        while chosen.len() < count {
            let dist = shortest_path_tree(&undirected, &from, inside);
            let farthest = members
                .iter()
                .copied()
                .filter(|v| !chosen.contains(v))
                .max_by_key(|&v| {
                    let d = dist[v as usize];
                    // unreachable members sort last, ties go to the smaller id
                    (d != WEIGHT_INFINITY, if d == WEIGHT_INFINITY { 0 } else { d }, std::cmp::Reverse(v))
                });
            let Some(next) = farthest else {
                break;
            };
            chosen.push(next);
            from = chosen.clone();
        }
        chosen
    }

    fn prepare(&self) -> LandmarkStorage {
        let start = Instant::now();
        let n = self.graph.node_count();
        let k = self.section.landmarks;
        let (subnetworks, subnetwork_count) =
            find_subnetworks(self.graph, self.weighting, self.section.min_subnetwork_size, self.regions);

        let mut members: Vec<Vec<NodeId>> = vec![Vec::new(); subnetwork_count];
        for (v, &s) in subnetworks.iter().enumerate() {
            if s != NO_SUBNETWORK {
                members[s as usize].push(v as NodeId);
            }
        }

        let landmarks: Vec<Vec<NodeId>> = (0..subnetwork_count)
            .into_par_iter()
            .map(|s| {
                if s as u32 == NO_SUBNETWORK {
                    Vec::new()
                } else {
                    self.select(&subnetworks, &members[s], s as u32)
                }
            })
            .collect();

        let tasks: Vec<(u32, usize, NodeId)> = landmarks
            .iter()
            .enumerate()
            .flat_map(|(s, list)| list.iter().enumerate().map(move |(i, &l)| (s as u32, i, l)))
            .collect();

        let forward = NodeBasedGraph::new(self.graph, self.weighting);
        let backward = NodeBasedGraph::backward(self.graph, self.weighting);
        let trees: Vec<(u32, usize, Vec<Weight>, Vec<Weight>)> = tasks
            .par_iter()
            .map(|&(s, i, landmark)| {
                let inside = |v: StateId| subnetworks[v as usize] == s;
                let from = shortest_path_tree(&forward, &[landmark], inside);
                let to = shortest_path_tree(&backward, &[landmark], inside);
                let pick = |d: &[Weight]| -> Vec<Weight> {
                    members[s as usize].iter().map(|&v| d[v as usize]).collect()
                };
                (s, i, pick(&from), pick(&to))
            })
            .collect();

        let factor = match self.maximum_weight {
            Some(max) => to_weight(max) as f64 / MAX_QUANTIZED as f64,
            None => {
                let observed = trees
                    .iter()
                    .flat_map(|(_, _, f, t)| f.iter().chain(t.iter()))
                    .copied()
                    .filter(|&d| d != WEIGHT_INFINITY)
                    .max()
                    .unwrap_or(0);
                observed as f64 / MAX_QUANTIZED as f64
            }
        };
        let factor = if factor > 0.0 { factor } else { 1.0 };

        let mut from = vec![INFINITE; n * k];
        let mut to = vec![INFINITE; n * k];
        let mut saturated = 0usize;
        for (s, i, f, t) in &trees {
            for (j, &v) in members[*s as usize].iter().enumerate() {
                let (qf, qt) = (quantize(f[j], factor), quantize(t[j], factor));
                saturated += (qf == SATURATED) as usize + (qt == SATURATED) as usize;
                from[v as usize * k + i] = qf;
                to[v as usize * k + i] = qt;
            }
        }
        if saturated > 0 {
            warn!(
                profile = self.profile,
                saturated,
                "landmark distances exceed maximum_weight and were saturated"
            );
        }

        info!(
            profile = self.profile,
            subnetworks = subnetwork_count - 1,
            landmarks = tasks.len(),
            factor,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "landmarks ready"
        );

        LandmarkStorage {
            profile: self.profile.to_string(),
            weighting: self.weighting.name().to_string(),
            factor,
            landmark_count: k,
            subnetworks,
            landmarks,
            from,
            to,
        }
    }
}
