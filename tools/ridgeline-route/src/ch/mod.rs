//! Contraction hierarchies
//!
//! Node-based profiles contract graph nodes. Edge-based profiles (turn costs)
//! contract the directed-edge state graph instead, so turn costs and turn
//! restrictions end up inside the shortcut weights and the query needs no
//! special handling for them.

mod graph;
mod prepare_graph;
mod preparation;
mod query;

pub use graph::{ArcKind, ChArc, ChGraph};
pub use preparation::ChPreparation;
pub use query::ChQuery;

use ridgeline_common::Result;

use crate::config::ChParams;
use crate::graph::RoutingGraph;
use crate::search::{EdgeBasedGraph, NodeBasedGraph};
use crate::weighting::Weighting;

/// Prepare the hierarchy of one profile.
///
/// Fails before doing any work when the weighting cannot be evaluated on
/// this graph.
pub fn prepare(
    profile: &str,
    graph: &RoutingGraph,
    weighting: &dyn Weighting,
    params: &ChParams,
) -> Result<ChGraph> {
    weighting.validate(graph)?;
    let preparation = ChPreparation::new(profile, params);
    if weighting.has_turn_costs() {
        preparation.run(&EdgeBasedGraph::new(graph, weighting), true)
    } else {
        preparation.run(&NodeBasedGraph::new(graph, weighting), false)
    }
}
