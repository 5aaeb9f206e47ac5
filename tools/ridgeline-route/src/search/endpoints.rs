//! Search seeds for snapped endpoints
//!
//! A snapped point either sits on a tower node or splits an edge at some
//! fraction of its length. Instead of inserting virtual nodes into the shared
//! graph, the split edge's partial weights are folded into the initial and
//! final costs of the search, and connections that never leave the split
//! edge are evaluated directly.

use serde::Serialize;

use super::{directed_edge, EdgeBasedGraph, PathEdge, Seed};
use crate::graph::{EdgeId, NodeId, RoutingGraph};
use crate::weighting::{edge_weight, Weight, Weighting, WEIGHT_INFINITY};

/// Where a request point landed on the graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    Node { node: NodeId },
    Edge { edge: EdgeId, fraction: f64 },
}

fn partial(weight: Weight, share: f64) -> Weight {
    if weight == WEIGHT_INFINITY {
        WEIGHT_INFINITY
    } else {
        (weight as f64 * share).round() as Weight
    }
}

fn piece(edge: EdgeId, reverse: bool, from: f64, to: f64) -> Option<PathEdge> {
    Some(PathEdge::Virtual {
        original_edge: edge,
        reverse,
        from_fraction: from,
        to_fraction: to,
    })
}

/// Cost of the pieces of `edge` on either side of `fraction`:
/// (toward adj walking forward, toward base walking backward)
fn split_weights(graph: &RoutingGraph, weighting: &dyn Weighting, edge: EdgeId, fraction: f64) -> (Weight, Weight) {
    let fwd = edge_weight(weighting, graph, edge, false);
    let bwd = edge_weight(weighting, graph, edge, true);
    (partial(fwd, 1.0 - fraction), partial(bwd, fraction))
}

/// Node-based seeds where the search starts
pub fn source_seeds_nodes(graph: &RoutingGraph, weighting: &dyn Weighting, location: Location) -> Vec<Seed> {
    match location {
        Location::Node { node } => vec![Seed {
            state: node,
            weight: 0,
            edge: None,
        }],
        Location::Edge { edge, fraction } => {
            let view = graph.edge(edge);
            let (to_adj, to_base) = split_weights(graph, weighting, edge, fraction);
            let mut seeds = Vec::with_capacity(2);
            if to_adj != WEIGHT_INFINITY {
                seeds.push(Seed {
                    state: view.adj,
                    weight: to_adj,
                    edge: piece(edge, false, fraction, 1.0),
                });
            }
            if to_base != WEIGHT_INFINITY {
                seeds.push(Seed {
                    state: view.base,
                    weight: to_base,
                    edge: piece(edge, true, fraction, 0.0),
                });
            }
            seeds
        }
    }
}

/// Node-based seeds where the search may end, with the exit cost to the point
pub fn target_seeds_nodes(graph: &RoutingGraph, weighting: &dyn Weighting, location: Location) -> Vec<Seed> {
    match location {
        Location::Node { node } => vec![Seed {
            state: node,
            weight: 0,
            edge: None,
        }],
        Location::Edge { edge, fraction } => {
            let view = graph.edge(edge);
            let fwd = edge_weight(weighting, graph, edge, false);
            let bwd = edge_weight(weighting, graph, edge, true);
            let mut seeds = Vec::with_capacity(2);
            if fwd != WEIGHT_INFINITY {
                seeds.push(Seed {
                    state: view.base,
                    weight: partial(fwd, fraction),
                    edge: piece(edge, false, 0.0, fraction),
                });
            }
            if bwd != WEIGHT_INFINITY {
                seeds.push(Seed {
                    state: view.adj,
                    weight: partial(bwd, 1.0 - fraction),
                    edge: piece(edge, true, 1.0, fraction),
                });
            }
            seeds
        }
    }
}

/// Edge-based seeds: the directed edges a route can start on, with the
/// partial edge and the first turn already paid
pub fn source_seeds_edges(graph: &RoutingGraph, weighting: &dyn Weighting, location: Location) -> Vec<Seed> {
    let states = EdgeBasedGraph::new(graph, weighting);
    let mut seeds = Vec::new();
    match location {
        Location::Node { node } => {
            for cursor in graph.edges(node) {
                let state = directed_edge(cursor.edge, cursor.reverse);
                if states.state_weight(state) != WEIGHT_INFINITY {
                    seeds.push(Seed {
                        state,
                        weight: 0,
                        edge: None,
                    });
                }
            }
        }
        Location::Edge { edge, fraction } => {
            let view = graph.edge(edge);
            let (to_adj, to_base) = split_weights(graph, weighting, edge, fraction);
            for (via, entry, first) in [
                (view.adj, to_adj, piece(edge, false, fraction, 1.0)),
                (view.base, to_base, piece(edge, true, fraction, 0.0)),
            ] {
                if entry == WEIGHT_INFINITY {
                    continue;
                }
                states.for_each_turn(edge, via, &mut |state, turn| {
                    seeds.push(Seed {
                        state,
                        weight: entry.saturating_add(turn),
                        edge: first,
                    });
                });
            }
        }
    }
    seeds
}

/// Edge-based seeds where the route may end; the exit cost covers the
/// state's own edge (fully for tower targets, partially otherwise)
pub fn target_seeds_edges(graph: &RoutingGraph, weighting: &dyn Weighting, location: Location) -> Vec<Seed> {
    let states = EdgeBasedGraph::new(graph, weighting);
    let mut seeds = Vec::new();
    match location {
        Location::Node { node } => {
            for cursor in graph.edges(node) {
                let state = directed_edge(cursor.edge, !cursor.reverse);
                let weight = states.state_weight(state);
                if weight != WEIGHT_INFINITY {
                    seeds.push(Seed {
                        state,
                        weight,
                        edge: Some(PathEdge::Base {
                            edge: cursor.edge,
                            reverse: !cursor.reverse,
                        }),
                    });
                }
            }
        }
        Location::Edge { edge, fraction } => {
            let fwd = states.state_weight(directed_edge(edge, false));
            if fwd != WEIGHT_INFINITY {
                seeds.push(Seed {
                    state: directed_edge(edge, false),
                    weight: partial(fwd, fraction),
                    edge: piece(edge, false, 0.0, fraction),
                });
            }
            let bwd = states.state_weight(directed_edge(edge, true));
            if bwd != WEIGHT_INFINITY {
                seeds.push(Seed {
                    state: directed_edge(edge, true),
                    weight: partial(bwd, 1.0 - fraction),
                    edge: piece(edge, true, 1.0, fraction),
                });
            }
        }
    }
    seeds
}

pub fn source_seeds(graph: &RoutingGraph, weighting: &dyn Weighting, location: Location, edge_based: bool) -> Vec<Seed> {
    if edge_based {
        source_seeds_edges(graph, weighting, location)
    } else {
        source_seeds_nodes(graph, weighting, location)
    }
}

pub fn target_seeds(graph: &RoutingGraph, weighting: &dyn Weighting, location: Location, edge_based: bool) -> Vec<Seed> {
    if edge_based {
        target_seeds_edges(graph, weighting, location)
    } else {
        target_seeds_nodes(graph, weighting, location)
    }
}

/// Connection between two endpoints that stays on a single edge, if any.
///
/// Searches only see routes that pass a tower node, so these candidates are
/// compared against the search result by the caller.
pub fn direct_connection(
    graph: &RoutingGraph,
    weighting: &dyn Weighting,
    from: Location,
    to: Location,
) -> Option<(Weight, Vec<PathEdge>)> {
    let fwd = |e| edge_weight(weighting, graph, e, false);
    let bwd = |e| edge_weight(weighting, graph, e, true);
    let mut candidates: Vec<(Weight, Vec<PathEdge>)> = Vec::with_capacity(2);

    match (from, to) {
        (Location::Node { node: a }, Location::Node { node: b }) if a == b => {
            candidates.push((0, Vec::new()));
        }
        (Location::Node { .. }, Location::Node { .. }) => {}
        (
            Location::Edge { edge: e1, fraction: fs },
            Location::Edge { edge: e2, fraction: ft },
        ) if e1 == e2 => {
            if ft == fs {
                candidates.push((0, Vec::new()));
            } else if ft > fs {
                candidates.push((partial(fwd(e1), ft - fs), piece(e1, false, fs, ft).into_iter().collect()));
            } else {
                candidates.push((partial(bwd(e1), fs - ft), piece(e1, true, fs, ft).into_iter().collect()));
            }
        }
        (Location::Edge { .. }, Location::Edge { .. }) => {}
        (Location::Edge { edge, fraction }, Location::Node { node }) => {
            let view = graph.edge(edge);
            if node == view.adj {
                candidates.push((partial(fwd(edge), 1.0 - fraction), piece(edge, false, fraction, 1.0).into_iter().collect()));
            }
            if node == view.base {
                candidates.push((partial(bwd(edge), fraction), piece(edge, true, fraction, 0.0).into_iter().collect()));
            }
        }
        (Location::Node { node }, Location::Edge { edge, fraction }) => {
            let view = graph.edge(edge);
            if node == view.base {
                candidates.push((partial(fwd(edge), fraction), piece(edge, false, 0.0, fraction).into_iter().collect()));
            }
            if node == view.adj {
                candidates.push((partial(bwd(edge), 1.0 - fraction), piece(edge, true, 1.0, fraction).into_iter().collect()));
            }
        }
    }

    candidates
        .into_iter()
        .filter(|(w, _)| *w != WEIGHT_INFINITY)
        .min_by_key(|(w, _)| *w)
}
