//! Location index: maps coordinates onto the graph
//!
//! Edge segments are stored in a quadtree whose cells split until they hold
//! at most `max_entries_per_cell` segments or reach the configured
//! resolution. A lookup searches growing rings around the query point and
//! snaps onto the closest point of any accepted edge polyline, which may lie
//! in the middle of an edge.

mod quadtree;

pub use quadtree::{Cell, QuadTree};

use std::time::Instant;

use ridgeline_common::PointFailureReason;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::IndexConfig;
use crate::formats::crc::checksum;
use crate::graph::geometry::{closest_on_segment, haversine_m};
use crate::graph::{BBox, EdgeId, NodeId, RoutingGraph};
use crate::search::Location;

/// Closest accepted point on the graph for one coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snap {
    pub location: Location,
    /// Edge the point lies on
    pub edge: EdgeId,
    /// Snapped coordinate (lat, lon)
    pub point: (f64, f64),
    pub distance_m: f64,
}

/// Index that has not been built yet. [`LocationIndexBuilder::build`]
/// consumes it and hands back a queryable [`LocationIndex`].
#[derive(Debug, Clone)]
pub struct LocationIndexBuilder {
    config: IndexConfig,
}

impl LocationIndexBuilder {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn build(self, graph: &RoutingGraph) -> LocationIndex {
        let start = Instant::now();
        let mut items = Vec::new();
        for edge in 0..graph.edge_count() as EdgeId {
            for seg in graph.geometry(edge).windows(2) {
                let mut b = BBox::empty();
                b.extend(seg[0].0, seg[0].1);
                b.extend(seg[1].0, seg[1].1);
                items.push((edge, b));
            }
        }
        let bbox = graph.bounds();
        let limits = quadtree::Limits {
            max_entries: self.config.max_entries_per_cell,
            resolution_m: self.config.resolution_m,
        };
        let tree = if bbox.is_empty() {
            QuadTree {
                bbox,
                cells: vec![Cell::Leaf { edges: Vec::new() }],
            }
        } else {
            QuadTree::build(bbox, items, &limits)
        };
        info!(
            cells = tree.cell_count(),
            edges = graph.edge_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "location index built"
        );
        LocationIndex {
            resolution_m: self.config.resolution_m,
            max_region_search: self.config.max_region_search,
            tree,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationIndex {
    pub(crate) resolution_m: f64,
    pub(crate) max_region_search: usize,
    pub(crate) tree: QuadTree,
}

impl LocationIndex {
    /// Fingerprint of the parameters that shape the stored tree
    pub fn config_version(config: &IndexConfig) -> u64 {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&config.resolution_m.to_le_bytes());
        bytes.extend_from_slice(&(config.max_entries_per_cell as u64).to_le_bytes());
        checksum(&bytes)
    }

    pub fn with_max_region_search(mut self, rings: usize) -> Self {
        self.max_region_search = rings;
        self
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    /// Closest point on any edge accepted by `filter`.
    ///
    /// Ring `k` covers `k * resolution_m` around the query point. A candidate
    /// farther away than the ring that found it is confirmed by one more
    /// lookup covering its distance. Nothing beyond the outermost ring,
    /// `max_region_search * resolution_m`, is ever returned.
    pub fn nearest(
        &self,
        graph: &RoutingGraph,
        lat: f64,
        lon: f64,
        filter: &dyn Fn(EdgeId) -> bool,
    ) -> Result<Snap, PointFailureReason> {
        if !(lat.is_finite() && lon.is_finite()) || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return Err(PointFailureReason::InvalidCoordinate);
        }
        if self.tree.is_empty() {
            return Err(PointFailureReason::EmptyIndex);
        }

        let max_radius = self.max_region_search as f64 * self.resolution_m;
        let mut candidates = Vec::new();
        for ring in 1..=self.max_region_search {
            let radius = ring as f64 * self.resolution_m;
            let Some(best) = self.closest_within(graph, lat, lon, radius, filter, &mut candidates) else {
                continue;
            };
            if best.distance_m <= radius {
                return Ok(best);
            }
            if best.distance_m > max_radius {
                continue;
            }
            debug!(ring, distance_m = best.distance_m, "confirming snap outside ring");
            let confirmed = self
                .closest_within(graph, lat, lon, best.distance_m, filter, &mut candidates)
                .unwrap_or(best);
            return Ok(confirmed);
        }
        Err(PointFailureReason::NoMatch)
    }

    fn closest_within(
        &self,
        graph: &RoutingGraph,
        lat: f64,
        lon: f64,
        radius_m: f64,
        filter: &dyn Fn(EdgeId) -> bool,
        candidates: &mut Vec<EdgeId>,
    ) -> Option<Snap> {
        // small margin for the flat-earth box against great-circle distances
        let area = BBox::around(lat, lon, radius_m * 1.05 + 1.0);
        self.tree.query(&area, candidates);
        candidates
            .iter()
            .filter(|&&e| filter(e))
            .filter_map(|&e| snap_to_edge(graph, e, lat, lon))
            .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m).then(a.edge.cmp(&b.edge)))
    }

    /// Tower nodes inside `bbox`, ascending. Nodes without edges are not indexed.
    pub fn within(&self, graph: &RoutingGraph, bbox: &BBox) -> Vec<NodeId> {
        let mut edges = Vec::new();
        self.tree.query(bbox, &mut edges);
        let mut nodes: Vec<NodeId> = edges
            .iter()
            .flat_map(|&e| {
                let view = graph.edge(e);
                [view.base, view.adj]
            })
            .filter(|&n| {
                let (lat, lon) = graph.coordinate(n);
                bbox.contains(lat, lon)
            })
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }
}

/// Closest point of one edge polyline
pub fn snap_to_edge(graph: &RoutingGraph, edge: EdgeId, lat: f64, lon: f64) -> Option<Snap> {
    let points = graph.geometry(edge);
    let mut lengths = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for seg in points.windows(2) {
        let len = haversine_m(seg[0].0, seg[0].1, seg[1].0, seg[1].1);
        lengths.push(len);
        total += len;
    }

    let mut best: Option<(f64, (f64, f64), f64)> = None;
    let mut walked = 0.0;
    for (i, seg) in points.windows(2).enumerate() {
        let (point, t) = closest_on_segment((lat, lon), seg[0], seg[1]);
        let d = haversine_m(lat, lon, point.0, point.1);
        if best.map_or(true, |(bd, _, _)| d < bd) {
            best = Some((d, point, walked + t * lengths[i]));
        }
        walked += lengths[i];
    }
    let (distance_m, point, along) = best?;

    let view = graph.edge(edge);
    let fraction = if total > 0.0 { along / total } else { 0.0 };
    let location = if fraction <= 1e-9 {
        Location::Node { node: view.base }
    } else if fraction >= 1.0 - 1e-9 {
        Location::Node { node: view.adj }
    } else {
        Location::Edge { edge, fraction }
    };
    Some(Snap {
        location,
        edge,
        point,
        distance_m,
    })
}
