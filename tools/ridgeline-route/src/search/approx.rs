//! Remaining-weight estimates for goal-directed search

use crate::graph::geometry::haversine_m;
use crate::graph::{NodeId, RoutingGraph};
use crate::weighting::{Weight, Weighting, WEIGHT_PRECISION};

/// Lower bound on the weight still needed from a node to the nearest target.
///
/// Implementations must never overestimate; A* then returns optimal paths
/// even when the bound is not consistent.
pub trait Approximator {
    fn approximate(&self, node: NodeId) -> Weight;
}

/// Plain Dijkstra
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroApproximator;

impl Approximator for ZeroApproximator {
    fn approximate(&self, _node: NodeId) -> Weight {
        0
    }
}

/// Great-circle distance times the weighting's cheapest weight per meter.
///
/// Only admissible when stored edge distances are at least the beeline
/// between their endpoints, so routers use it on explicit request only.
pub struct BeelineApproximator<'a> {
    graph: &'a RoutingGraph,
    weight_per_meter: f64,
    targets: Vec<((f64, f64), Weight)>,
}

impl<'a> BeelineApproximator<'a> {
    /// `targets` are (node, exit weight) pairs
    pub fn new(graph: &'a RoutingGraph, weighting: &dyn Weighting, targets: &[(NodeId, Weight)]) -> Self {
        Self {
            graph,
            weight_per_meter: weighting.min_weight_per_meter() * WEIGHT_PRECISION,
            targets: targets
                .iter()
                .map(|&(node, exit)| (graph.coordinate(node), exit))
                .collect(),
        }
    }
}

impl Approximator for BeelineApproximator<'_> {
    fn approximate(&self, node: NodeId) -> Weight {
        let (lat, lon) = self.graph.coordinate(node);
        self.targets
            .iter()
            .map(|&((t_lat, t_lon), exit)| {
                let bound = (haversine_m(lat, lon, t_lat, t_lon) * self.weight_per_meter).floor() as Weight;
                bound.saturating_add(exit)
            })
            .min()
            .unwrap_or(0)
    }
}
