//! Shared search plumbing
//!
//! Searches run over *states*. Node-based profiles use graph nodes as states;
//! edge-based profiles (turn costs) use directed edges, `edge * 2 + reverse`.
//! A state's distance is the cost of reaching it: the node itself, or for a
//! directed edge the moment it is entered (its tail node, turn included).
//!
//! Every arc carries a *label*: the directed edge it traverses. Converting a
//! found path to [`PathEdge`]s therefore never needs to know which kind of
//! state graph produced it.

pub mod approx;
pub mod astar;
pub mod endpoints;
pub mod path;
pub mod tree;

use crate::graph::{EdgeId, NodeId, RoutingGraph};
use crate::weighting::{edge_weight, to_weight, Weight, Weighting, WEIGHT_INFINITY};

pub use approx::{Approximator, BeelineApproximator, ZeroApproximator};
pub use astar::{AStar, SearchOutcome};
pub use endpoints::Location;
pub use path::PathEdge;
pub use tree::shortest_path_tree;

pub type StateId = u32;

/// Directed edge label of `edge` walked in the given direction
pub fn directed_edge(edge: EdgeId, reverse: bool) -> u32 {
    edge * 2 + reverse as u32
}

/// Inverse of [`directed_edge`]
pub fn split_directed_edge(label: u32) -> (EdgeId, bool) {
    (label >> 1, label & 1 == 1)
}

/// Start or end of a search with its entry/exit cost
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    pub state: StateId,
    pub weight: Weight,
    /// Edge piece walked before a source state or after a target state
    pub edge: Option<PathEdge>,
}

/// Result of one point-to-point search, before conversion to path edges
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPath {
    pub weight: Weight,
    /// Index of the source seed the path starts with
    pub source: usize,
    /// Index of the target seed the path ends with
    pub target: usize,
    /// Directed edges between the two seed states
    pub labels: Vec<u32>,
    pub visited: usize,
}

impl SearchPath {
    pub fn edges(&self, sources: &[Seed], targets: &[Seed]) -> Vec<PathEdge> {
        let mut edges = Vec::with_capacity(self.labels.len() + 2);
        edges.extend(sources[self.source].edge);
        edges.extend(self.labels.iter().map(|&l| PathEdge::from_label(l)));
        edges.extend(targets[self.target].edge);
        edges
    }
}

/// Forward adjacency over states with fixed-point arc weights
pub trait StateGraph {
    fn state_count(&self) -> usize;

    /// Graph node used for heuristics: the node itself or the tail of a directed edge
    fn node_of(&self, state: StateId) -> NodeId;

    /// Call `f(to, weight, label)` for each usable arc leaving `state`
    fn for_each_arc(&self, state: StateId, f: &mut dyn FnMut(StateId, Weight, u32));
}

/// Nodes as states; optionally walks arcs backwards (predecessors)
pub struct NodeBasedGraph<'a> {
    graph: &'a RoutingGraph,
    weighting: &'a dyn Weighting,
    backward: bool,
}

impl<'a> NodeBasedGraph<'a> {
    pub fn new(graph: &'a RoutingGraph, weighting: &'a dyn Weighting) -> Self {
        Self {
            graph,
            weighting,
            backward: false,
        }
    }

    /// Arcs reversed: `for_each_arc(v)` yields every `u` with an arc u → v
    pub fn backward(graph: &'a RoutingGraph, weighting: &'a dyn Weighting) -> Self {
        Self {
            graph,
            weighting,
            backward: true,
        }
    }
}

impl StateGraph for NodeBasedGraph<'_> {
    fn state_count(&self) -> usize {
        self.graph.node_count()
    }

    fn node_of(&self, state: StateId) -> NodeId {
        state
    }

    fn for_each_arc(&self, state: StateId, f: &mut dyn FnMut(StateId, Weight, u32)) {
        for cursor in self.graph.edges(state) {
            if cursor.adj == state {
                continue;
            }
            let reverse = cursor.reverse ^ self.backward;
            let w = edge_weight(self.weighting, self.graph, cursor.edge, reverse);
            if w != WEIGHT_INFINITY {
                f(cursor.adj, w, directed_edge(cursor.edge, reverse));
            }
        }
    }
}

/// Directed edges as states, with turn costs between them
pub struct EdgeBasedGraph<'a> {
    graph: &'a RoutingGraph,
    weighting: &'a dyn Weighting,
}

impl<'a> EdgeBasedGraph<'a> {
    pub fn new(graph: &'a RoutingGraph, weighting: &'a dyn Weighting) -> Self {
        Self { graph, weighting }
    }

    /// Entry cost of a state: its edge weight, `WEIGHT_INFINITY` if closed
    pub fn state_weight(&self, state: StateId) -> Weight {
        let (edge, reverse) = split_directed_edge(state);
        edge_weight(self.weighting, self.graph, edge, reverse)
    }

    /// Turn from the edge behind `from_label` at `via` onto every open edge
    /// leaving `via`; calls `f(state, turn_weight)`
    pub fn for_each_turn(&self, from_edge: EdgeId, via: NodeId, f: &mut dyn FnMut(StateId, Weight)) {
        for cursor in self.graph.edges(via) {
            let next = directed_edge(cursor.edge, cursor.reverse);
            if self.state_weight(next) == WEIGHT_INFINITY {
                continue;
            }
            let turn = to_weight(self.weighting.turn_weight(from_edge, via, cursor.edge));
            if turn != WEIGHT_INFINITY {
                f(next, turn);
            }
        }
    }
}

impl StateGraph for EdgeBasedGraph<'_> {
    fn state_count(&self) -> usize {
        self.graph.edge_count() * 2
    }

    fn node_of(&self, state: StateId) -> NodeId {
        let (edge, reverse) = split_directed_edge(state);
        self.graph.tail(edge, reverse)
    }

    fn for_each_arc(&self, state: StateId, f: &mut dyn FnMut(StateId, Weight, u32)) {
        let own = self.state_weight(state);
        if own == WEIGHT_INFINITY {
            return;
        }
        let (edge, reverse) = split_directed_edge(state);
        let via = self.graph.head(edge, reverse);
        self.for_each_turn(edge, via, &mut |next, turn| {
            f(next, own.saturating_add(turn), state);
        });
    }
}
