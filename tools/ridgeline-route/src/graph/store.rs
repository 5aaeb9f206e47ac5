//! Frozen road graph - columnar node/edge storage with CSR incidence lists
//!
//! Nodes and edges are stored column by column (fixed-point coordinates,
//! millimeter lengths, packed flags). Every edge is listed in the incidence
//! list of both endpoints, a loop twice at its node; the cursor's `reverse`
//! bit tells whether it is traversed against its stored base → adj direction.

use ridgeline_common::{Result, RouteError};
use sha2::{Digest, Sha256};

use super::encoding::{EdgeFlags, EncodingManager};
use super::geometry::{from_fixed, haversine_m, BBox};
use super::turn_costs::TurnCostTable;
use super::{EdgeId, NodeId};

/// SHA-256 over the graph columns; preparations remember it to detect a changed graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphSignature(pub [u8; 32]);

impl GraphSignature {
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Raw columns of a graph, as produced by the builder or read from disk
#[derive(Debug, Clone, Default)]
pub struct GraphParts {
    pub lat_e7: Vec<i32>,
    pub lon_e7: Vec<i32>,
    /// Meters; NaN where unknown. Empty when no node carries elevation.
    pub elevation: Vec<f32>,
    pub edge_base: Vec<NodeId>,
    pub edge_adj: Vec<NodeId>,
    pub edge_length_mm: Vec<u32>,
    pub edge_flags: Vec<u64>,
    /// Pillar offsets, `edge_count + 1` entries
    pub geo_offsets: Vec<u32>,
    pub geo_lat_e7: Vec<i32>,
    pub geo_lon_e7: Vec<i32>,
    pub turn_costs: TurnCostTable,
}

/// Read-only view of one stored edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeView {
    pub id: EdgeId,
    pub base: NodeId,
    pub adj: NodeId,
    pub distance_m: f64,
    pub flags: EdgeFlags,
}

/// Edge as seen from one of its endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeCursor {
    pub edge: EdgeId,
    /// The node whose incidence list produced this cursor
    pub base: NodeId,
    pub adj: NodeId,
    /// True when `base` is the stored adj node, i.e. the edge is walked backwards
    pub reverse: bool,
}

#[derive(Debug)]
pub struct RoutingGraph {
    encoding: EncodingManager,
    parts: GraphParts,
    adj_offsets: Vec<u32>,
    /// `edge << 1 | reverse`, grouped by the node the edge leaves from
    adj_edges: Vec<u32>,
    bounds: BBox,
    signature: GraphSignature,
}

impl RoutingGraph {
    /// Validate columns and build the incidence lists
    pub fn from_parts(encoding: EncodingManager, parts: GraphParts) -> Result<Self> {
        let n = parts.lat_e7.len();
        let m = parts.edge_base.len();

        if parts.lon_e7.len() != n || (!parts.elevation.is_empty() && parts.elevation.len() != n) {
            return Err(RouteError::GraphInput("node columns differ in length".into()));
        }
        if parts.edge_adj.len() != m
            || parts.edge_length_mm.len() != m
            || parts.edge_flags.len() != m
            || parts.geo_offsets.len() != m + 1
        {
            return Err(RouteError::GraphInput("edge columns differ in length".into()));
        }
        if parts.geo_lat_e7.len() != parts.geo_lon_e7.len()
            || parts.geo_offsets.last().copied().unwrap_or(0) as usize != parts.geo_lat_e7.len()
            || parts.geo_offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(RouteError::GraphInput("pillar offsets are inconsistent".into()));
        }
        if m > (u32::MAX >> 1) as usize {
            return Err(RouteError::GraphInput(format!("{m} edges exceed the edge id range")));
        }
        if let Some(bad) = parts
            .edge_base
            .iter()
            .chain(parts.edge_adj.iter())
            .find(|&&v| v as usize >= n)
        {
            return Err(RouteError::GraphInput(format!(
                "edge references node {bad} but only {n} nodes exist"
            )));
        }

        // Incidence CSR: count, prefix sum, fill. A loop gets both orientations.
        let mut adj_offsets = vec![0u32; n + 1];
        for e in 0..m {
            adj_offsets[parts.edge_base[e] as usize + 1] += 1;
            adj_offsets[parts.edge_adj[e] as usize + 1] += 1;
        }
        for i in 0..n {
            adj_offsets[i + 1] += adj_offsets[i];
        }
        let mut fill = adj_offsets.clone();
        let mut adj_edges = vec![0u32; adj_offsets[n] as usize];
        for e in 0..m {
            let (a, b) = (parts.edge_base[e] as usize, parts.edge_adj[e] as usize);
            adj_edges[fill[a] as usize] = (e as u32) << 1;
            fill[a] += 1;
            adj_edges[fill[b] as usize] = (e as u32) << 1 | 1;
            fill[b] += 1;
        }

        let mut bounds = BBox::empty();
        for i in 0..n {
            bounds.extend(from_fixed(parts.lat_e7[i]), from_fixed(parts.lon_e7[i]));
        }
        for i in 0..parts.geo_lat_e7.len() {
            bounds.extend(from_fixed(parts.geo_lat_e7[i]), from_fixed(parts.geo_lon_e7[i]));
        }

        let signature = compute_signature(&encoding, &parts);

        Ok(Self {
            encoding,
            parts,
            adj_offsets,
            adj_edges,
            bounds,
            signature,
        })
    }

    pub fn parts(&self) -> &GraphParts {
        &self.parts
    }

    pub fn encoding(&self) -> &EncodingManager {
        &self.encoding
    }

    pub fn node_count(&self) -> usize {
        self.parts.lat_e7.len()
    }

    pub fn edge_count(&self) -> usize {
        self.parts.edge_base.len()
    }

    pub fn signature(&self) -> GraphSignature {
        self.signature
    }

    /// Bounding box of all tower and pillar coordinates
    pub fn bounds(&self) -> BBox {
        self.bounds
    }

    pub fn coordinate(&self, node: NodeId) -> (f64, f64) {
        let i = node as usize;
        (from_fixed(self.parts.lat_e7[i]), from_fixed(self.parts.lon_e7[i]))
    }

    pub fn elevation(&self, node: NodeId) -> Option<f64> {
        self.parts
            .elevation
            .get(node as usize)
            .filter(|e| !e.is_nan())
            .map(|&e| e as f64)
    }

    pub fn edge(&self, edge: EdgeId) -> EdgeView {
        let e = edge as usize;
        EdgeView {
            id: edge,
            base: self.parts.edge_base[e],
            adj: self.parts.edge_adj[e],
            distance_m: self.parts.edge_length_mm[e] as f64 / 1000.0,
            flags: EdgeFlags(self.parts.edge_flags[e]),
        }
    }

    /// Incident edges of `node`, each oriented away from it
    pub fn edges(&self, node: NodeId) -> impl Iterator<Item = EdgeCursor> + '_ {
        let start = self.adj_offsets[node as usize] as usize;
        let end = self.adj_offsets[node as usize + 1] as usize;
        self.adj_edges[start..end].iter().map(move |&entry| {
            let edge = entry >> 1;
            let reverse = entry & 1 == 1;
            EdgeCursor {
                edge,
                base: node,
                adj: self.head(edge, reverse),
                reverse,
            }
        })
    }

    pub fn degree(&self, node: NodeId) -> usize {
        (self.adj_offsets[node as usize + 1] - self.adj_offsets[node as usize]) as usize
    }

    /// Node the edge leaves from when walked in the given direction
    pub fn tail(&self, edge: EdgeId, reverse: bool) -> NodeId {
        let e = edge as usize;
        if reverse {
            self.parts.edge_adj[e]
        } else {
            self.parts.edge_base[e]
        }
    }

    /// Node the edge arrives at when walked in the given direction
    pub fn head(&self, edge: EdgeId, reverse: bool) -> NodeId {
        self.tail(edge, !reverse)
    }

    pub fn turn_costs(&self) -> &TurnCostTable {
        &self.parts.turn_costs
    }

    /// Full polyline base → adj: tower, pillars, tower
    pub fn geometry(&self, edge: EdgeId) -> Vec<(f64, f64)> {
        let e = edge as usize;
        let start = self.parts.geo_offsets[e] as usize;
        let end = self.parts.geo_offsets[e + 1] as usize;
        let mut points = Vec::with_capacity(end - start + 2);
        points.push(self.coordinate(self.parts.edge_base[e]));
        for i in start..end {
            points.push((
                from_fixed(self.parts.geo_lat_e7[i]),
                from_fixed(self.parts.geo_lon_e7[i]),
            ));
        }
        points.push(self.coordinate(self.parts.edge_adj[e]));
        points
    }

    /// Length of the edge polyline in meters (not the stored distance)
    pub fn geometry_length_m(&self, edge: EdgeId) -> f64 {
        self.geometry(edge)
            .windows(2)
            .map(|w| haversine_m(w[0].0, w[0].1, w[1].0, w[1].1))
            .sum()
    }
}

fn compute_signature(encoding: &EncodingManager, parts: &GraphParts) -> GraphSignature {
    let mut hasher = Sha256::new();
    for v in encoding.vehicles() {
        hasher.update(v.name.as_bytes());
        hasher.update([v.max_speed_kmh, v.turn_costs as u8]);
    }
    hasher.update((parts.lat_e7.len() as u64).to_le_bytes());
    hasher.update((parts.edge_base.len() as u64).to_le_bytes());
    for i in 0..parts.lat_e7.len() {
        hasher.update(parts.lat_e7[i].to_le_bytes());
        hasher.update(parts.lon_e7[i].to_le_bytes());
    }
    for e in 0..parts.edge_base.len() {
        hasher.update(parts.edge_base[e].to_le_bytes());
        hasher.update(parts.edge_adj[e].to_le_bytes());
        hasher.update(parts.edge_length_mm[e].to_le_bytes());
        hasher.update(parts.edge_flags[e].to_le_bytes());
    }
    for (key, cost) in parts.turn_costs.sorted_entries() {
        hasher.update([key.vehicle]);
        hasher.update(key.from_edge.to_le_bytes());
        hasher.update(key.via_node.to_le_bytes());
        hasher.update(key.to_edge.to_le_bytes());
        hasher.update(cost.to_le_bytes());
    }
    GraphSignature(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use crate::graph::{EdgeFlags, EncodingManager, GraphBuilder, VehicleEncoding};

    #[test]
    fn test_incidence_lists_cover_both_endpoints() {
        let em = EncodingManager::new(vec![VehicleEncoding::new("car", 100)]).unwrap();
        let mut b = GraphBuilder::new(em);
        let n0 = b.add_node(0.0, 0.0).unwrap();
        let n1 = b.add_node(0.0, 0.001).unwrap();
        let n2 = b.add_node(0.001, 0.001).unwrap();
        let e0 = b.add_edge(n0, n1, 111.0, EdgeFlags::EMPTY).unwrap();
        let e1 = b.add_edge(n1, n2, 111.0, EdgeFlags::EMPTY).unwrap();
        let g = b.freeze().unwrap();

        let at_n1: Vec<_> = g.edges(n1).collect();
        assert_eq!(at_n1.len(), 2);
        let back = at_n1.iter().find(|c| c.edge == e0).unwrap();
        assert!(back.reverse);
        assert_eq!(back.adj, n0);
        let fwd = at_n1.iter().find(|c| c.edge == e1).unwrap();
        assert!(!fwd.reverse);
        assert_eq!(fwd.adj, n2);

        assert_eq!(g.head(e0, false), n1);
        assert_eq!(g.head(e0, true), n0);
    }

    #[test]
    fn test_loop_is_listed_in_both_directions() {
        let em = EncodingManager::new(vec![VehicleEncoding::new("car", 100)]).unwrap();
        let mut b = GraphBuilder::new(em);
        let n0 = b.add_node(0.0, 0.0).unwrap();
        let n1 = b.add_node(0.0, 0.001).unwrap();
        let e0 = b.add_edge(n0, n1, 111.0, EdgeFlags::EMPTY).unwrap();
        let lp = b
            .add_edge_with_geometry(n1, n1, 300.0, EdgeFlags::EMPTY, &[(0.001, 0.001), (0.001, 0.002)])
            .unwrap();
        let g = b.freeze().unwrap();

        assert_eq!(g.degree(n1), 3);
        let mut at_n1: Vec<_> = g.edges(n1).map(|c| (c.edge, c.reverse, c.adj)).collect();
        at_n1.sort_unstable();
        assert_eq!(at_n1, vec![(e0, true, n0), (lp, false, n1), (lp, true, n1)]);
    }

    #[test]
    fn test_signature_changes_with_flags() {
        let build = |flags: u64| {
            let em = EncodingManager::new(vec![VehicleEncoding::new("car", 100)]).unwrap();
            let mut b = GraphBuilder::new(em);
            let a = b.add_node(0.0, 0.0).unwrap();
            let c = b.add_node(0.0, 0.001).unwrap();
            b.add_edge(a, c, 100.0, EdgeFlags(flags)).unwrap();
            b.freeze().unwrap()
        };
        assert_eq!(build(1).signature(), build(1).signature());
        assert_ne!(build(1).signature(), build(3).signature());
    }

    #[test]
    fn test_geometry_includes_pillars() {
        let em = EncodingManager::new(vec![VehicleEncoding::new("car", 100)]).unwrap();
        let mut b = GraphBuilder::new(em);
        let a = b.add_node(0.0, 0.0).unwrap();
        let c = b.add_node(0.0, 0.002).unwrap();
        let e = b
            .add_edge_with_geometry(a, c, 250.0, EdgeFlags::EMPTY, &[(0.001, 0.001)])
            .unwrap();
        let g = b.freeze().unwrap();
        let geom = g.geometry(e);
        assert_eq!(geom.len(), 3);
        assert!((geom[1].0 - 0.001).abs() < 1e-9);
        assert!(g.geometry_length_m(e) > g.edge(e).distance_m * 0.9);
    }
}
