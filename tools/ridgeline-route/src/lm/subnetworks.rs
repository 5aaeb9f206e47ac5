//! Subnetwork detection for landmark preparation

use std::collections::VecDeque;

use tracing::debug;

use super::storage::NO_SUBNETWORK;
use crate::graph::{NodeId, RoutingGraph};
use crate::weighting::{edge_weight, Weighting, WEIGHT_INFINITY};

/// Maps a coordinate to an area id. Edges between different areas are
/// ignored when splitting the graph into landmark subnetworks.
pub trait RegionLookup: Send + Sync {
    fn region(&self, lat: f64, lon: f64) -> u32;
}

impl<F> RegionLookup for F
where
    F: Fn(f64, f64) -> u32 + Send + Sync,
{
    fn region(&self, lat: f64, lon: f64) -> u32 {
        self(lat, lon)
    }
}

/// Undirected components over edges usable in at least one direction.
///
/// Components with fewer than `min_size` nodes get [`NO_SUBNETWORK`]; the
/// others are numbered from 1 in order of their smallest node id.
pub fn find_subnetworks(
    graph: &RoutingGraph,
    weighting: &dyn Weighting,
    min_size: usize,
    regions: Option<&dyn RegionLookup>,
) -> (Vec<u32>, usize) {
    let n = graph.node_count();
    let region_of: Option<Vec<u32>> = regions.map(|lookup| {
        (0..n as NodeId)
            .map(|v| {
                let (lat, lon) = graph.coordinate(v);
                lookup.region(lat, lon)
            })
            .collect()
    });

    let mut component = vec![u32::MAX; n];
    let mut members: Vec<Vec<NodeId>> = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..n as NodeId {
        if component[start as usize] != u32::MAX {
            continue;
        }
        let id = members.len() as u32;
        let mut nodes = vec![start];
        component[start as usize] = id;
        queue.push_back(start);
        while let Some(v) = queue.pop_front() {
            for cursor in graph.edges(v) {
                let u = cursor.adj;
                if component[u as usize] != u32::MAX {
                    continue;
                }
                let usable = edge_weight(weighting, graph, cursor.edge, false) != WEIGHT_INFINITY
                    || edge_weight(weighting, graph, cursor.edge, true) != WEIGHT_INFINITY;
                let same_region = region_of
                    .as_ref()
                    .map_or(true, |r| r[v as usize] == r[u as usize]);
                if usable && same_region {
                    component[u as usize] = id;
                    nodes.push(u);
                    queue.push_back(u);
                }
            }
        }
        members.push(nodes);
    }

    let mut subnetwork = vec![NO_SUBNETWORK; n];
    let mut next = 1u32;
    for nodes in &members {
        if nodes.len() < min_size.max(1) {
            continue;
        }
        for &v in nodes {
            subnetwork[v as usize] = next;
        }
        next += 1;
    }
    debug!(
        components = members.len(),
        subnetworks = next - 1,
        "landmark subnetworks"
    );
    (subnetwork, next as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightingKind;
    use crate::graph::{EdgeFlags, GraphBuilder};
    use crate::testing::{car_encoding, profile, weighting};
    use std::sync::Arc;

    fn two_islands() -> Arc<RoutingGraph> {
        let em = car_encoding();
        let slot = em.slot("test", "car").unwrap();
        let mut b = GraphBuilder::new(em);
        for i in 0..6 {
            b.add_node(0.0, i as f64 * 0.001).unwrap();
        }
        let open = b.encoding().encode(EdgeFlags::EMPTY, slot, true, true, 50.0);
        let closed = b.encoding().encode(EdgeFlags::EMPTY, slot, false, false, 50.0);
        b.add_edge(0, 1, 100.0, open).unwrap();
        b.add_edge(1, 2, 100.0, open).unwrap();
        b.add_edge(2, 3, 100.0, closed).unwrap();
        b.add_edge(3, 4, 100.0, open).unwrap();
        Arc::new(b.freeze().unwrap())
    }

    #[test]
    fn test_components_and_min_size() {
        let g = two_islands();
        let w = weighting(&g, &profile(WeightingKind::Shortest, false));
        let (ids, count) = find_subnetworks(&g, w.as_ref(), 2, None);
        assert_eq!(ids, vec![1, 1, 1, 2, 2, 0]);
        assert_eq!(count, 3);

        let (ids, _) = find_subnetworks(&g, w.as_ref(), 3, None);
        assert_eq!(ids, vec![1, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_region_boundary_splits() {
        let g = two_islands();
        let w = weighting(&g, &profile(WeightingKind::Shortest, false));
        let west_east = |_lat: f64, lon: f64| -> u32 { if lon < 0.0015 { 0 } else { 1 } };
        let (ids, _) = find_subnetworks(&g, w.as_ref(), 2, Some(&west_east));
        assert_eq!(ids, vec![1, 1, 0, 2, 2, 0]);
    }
}
