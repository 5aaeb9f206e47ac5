//! Graph builder - the mutable, append-only stage of the graph store
//!
//! The importer feeds nodes and edges in order; `freeze` consumes the builder
//! and returns the read-only [`RoutingGraph`]. Nothing can be added afterwards
//! because no builder is left to add to.

use ridgeline_common::{Result, RouteError};
use tracing::info;

use super::encoding::{EdgeFlags, EncodingManager, VehicleSlot};
use super::geometry::to_fixed;
use super::sort::dfs_order;
use super::store::{GraphParts, RoutingGraph};
use super::turn_costs::TurnKey;
use super::{EdgeId, NodeId};

/// Longest representable edge: u32 millimeters
const MAX_DISTANCE_M: f64 = u32::MAX as f64 / 1000.0;

pub struct GraphBuilder {
    encoding: EncodingManager,
    parts: GraphParts,
    has_elevation: bool,
}

impl GraphBuilder {
    pub fn new(encoding: EncodingManager) -> Self {
        Self {
            encoding,
            parts: GraphParts {
                geo_offsets: vec![0],
                ..GraphParts::default()
            },
            has_elevation: false,
        }
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

    pub fn add_node(&mut self, lat: f64, lon: f64) -> Result<NodeId> {
        self.push_node(lat, lon, f32::NAN)
    }

    pub fn add_node_with_elevation(&mut self, lat: f64, lon: f64, ele: f64) -> Result<NodeId> {
        self.has_elevation = true;
        self.push_node(lat, lon, ele as f32)
    }

    fn push_node(&mut self, lat: f64, lon: f64, ele: f32) -> Result<NodeId> {
        check_coordinate(lat, lon)?;
        let id = self.parts.lat_e7.len();
        if id >= NodeId::MAX as usize {
            return Err(RouteError::GraphInput("too many nodes".into()));
        }
        self.parts.lat_e7.push(to_fixed(lat));
        self.parts.lon_e7.push(to_fixed(lon));
        self.parts.elevation.push(ele);
        Ok(id as NodeId)
    }

    pub fn add_edge(&mut self, a: NodeId, b: NodeId, distance_m: f64, flags: EdgeFlags) -> Result<EdgeId> {
        self.add_edge_with_geometry(a, b, distance_m, flags, &[])
    }

    /// Add an edge with intermediate pillar points, ordered from `a` to `b`
    pub fn add_edge_with_geometry(
        &mut self,
        a: NodeId,
        b: NodeId,
        distance_m: f64,
        flags: EdgeFlags,
        pillars: &[(f64, f64)],
    ) -> Result<EdgeId> {
        let n = self.node_count();
        if a as usize >= n || b as usize >= n {
            return Err(RouteError::GraphInput(format!(
                "edge {a}-{b} references a node that was not added ({n} nodes)"
            )));
        }
        if !distance_m.is_finite() || !(0.0..=MAX_DISTANCE_M).contains(&distance_m) {
            return Err(RouteError::GraphInput(format!(
                "edge {a}-{b} has invalid distance {distance_m}"
            )));
        }
        let id = self.parts.edge_base.len();
        if id >= EdgeId::MAX as usize / 2 {
            return Err(RouteError::GraphInput("too many edges".into()));
        }
        for &(lat, lon) in pillars {
            check_coordinate(lat, lon)?;
            self.parts.geo_lat_e7.push(to_fixed(lat));
            self.parts.geo_lon_e7.push(to_fixed(lon));
        }
        self.parts.geo_offsets.push(self.parts.geo_lat_e7.len() as u32);
        self.parts.edge_base.push(a);
        self.parts.edge_adj.push(b);
        self.parts.edge_length_mm.push((distance_m * 1000.0).round() as u32);
        self.parts.edge_flags.push(flags.0);
        Ok(id as EdgeId)
    }

    /// Record a turn cost; `f64::INFINITY` forbids the turn
    pub fn add_turn_cost(
        &mut self,
        vehicle: VehicleSlot,
        from_edge: EdgeId,
        via_node: NodeId,
        to_edge: EdgeId,
        cost: f64,
    ) -> Result<()> {
        let encoded = self.encoding.vehicle(vehicle);
        if !encoded.turn_costs {
            return Err(RouteError::GraphInput(format!(
                "vehicle '{}' was encoded without turn costs",
                encoded.name
            )));
        }
        if cost.is_nan() || cost < 0.0 {
            return Err(RouteError::GraphInput(format!("invalid turn cost {cost}")));
        }
        for edge in [from_edge, to_edge] {
            let e = edge as usize;
            if e >= self.edge_count()
                || (self.parts.edge_base[e] != via_node && self.parts.edge_adj[e] != via_node)
            {
                return Err(RouteError::GraphInput(format!(
                    "turn via node {via_node}: edge {edge} is not incident"
                )));
            }
        }
        self.parts.turn_costs.insert(
            TurnKey {
                vehicle: vehicle.index() as u8,
                from_edge,
                via_node,
                to_edge,
            },
            cost,
        );
        Ok(())
    }

    pub fn freeze(mut self) -> Result<RoutingGraph> {
        if !self.has_elevation {
            self.parts.elevation.clear();
        }
        let graph = RoutingGraph::from_parts(self.encoding, self.parts)?;
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            signature = %graph.signature().hex(),
            "graph frozen"
        );
        Ok(graph)
    }

    /// Freeze after renumbering nodes in depth-first order.
    ///
    /// Returns the graph and `map[old_id] = new_id` so that callers can
    /// translate node ids they kept from the import.
    pub fn freeze_sorted(mut self) -> Result<(RoutingGraph, Vec<NodeId>)> {
        let n = self.node_count();
        let mut neighbors: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        for e in 0..self.edge_count() {
            let (a, b) = (self.parts.edge_base[e], self.parts.edge_adj[e]);
            neighbors[a as usize].push(b);
            neighbors[b as usize].push(a);
        }
        // Reverse so the stack pops neighbors in insertion order
        for list in &mut neighbors {
            list.reverse();
        }
        let map = dfs_order(n, |v| neighbors[v as usize].iter().copied());

        let mut lat = vec![0i32; n];
        let mut lon = vec![0i32; n];
        let mut ele = vec![f32::NAN; self.parts.elevation.len()];
        for old in 0..n {
            let new = map[old] as usize;
            lat[new] = self.parts.lat_e7[old];
            lon[new] = self.parts.lon_e7[old];
            if !ele.is_empty() {
                ele[new] = self.parts.elevation[old];
            }
        }
        self.parts.lat_e7 = lat;
        self.parts.lon_e7 = lon;
        self.parts.elevation = ele;
        for v in self.parts.edge_base.iter_mut().chain(self.parts.edge_adj.iter_mut()) {
            *v = map[*v as usize];
        }
        self.parts.turn_costs.remap_nodes(&map);

        let graph = self.freeze()?;
        Ok((graph, map))
    }
}

fn check_coordinate(lat: f64, lon: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(RouteError::GraphInput(format!(
            "coordinate {lat},{lon} out of range"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VehicleEncoding;

    fn builder() -> GraphBuilder {
        GraphBuilder::new(EncodingManager::new(vec![VehicleEncoding::new("car", 120).with_turn_costs()]).unwrap())
    }

    #[test]
    fn test_edge_to_unknown_node_fails() {
        let mut b = builder();
        let a = b.add_node(1.0, 1.0).unwrap();
        assert!(matches!(
            b.add_edge(a, 7, 10.0, EdgeFlags::EMPTY),
            Err(RouteError::GraphInput(_))
        ));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut b = builder();
        assert!(b.add_node(91.0, 0.0).is_err());
        let a = b.add_node(1.0, 1.0).unwrap();
        let c = b.add_node(1.0, 1.1).unwrap();
        assert!(b.add_edge(a, c, -1.0, EdgeFlags::EMPTY).is_err());
        assert!(b.add_edge(a, c, f64::NAN, EdgeFlags::EMPTY).is_err());
    }

    #[test]
    fn test_turn_cost_requires_incident_edges() {
        let mut b = builder();
        let slot = b.encoding().slot("p", "car").unwrap();
        let n: Vec<_> = (0..4).map(|i| b.add_node(0.0, i as f64 * 0.001).unwrap()).collect();
        let e0 = b.add_edge(n[0], n[1], 100.0, EdgeFlags::EMPTY).unwrap();
        let e1 = b.add_edge(n[1], n[2], 100.0, EdgeFlags::EMPTY).unwrap();
        let e2 = b.add_edge(n[2], n[3], 100.0, EdgeFlags::EMPTY).unwrap();

        b.add_turn_cost(slot, e0, n[1], e1, f64::INFINITY).unwrap();
        assert!(b.add_turn_cost(slot, e0, n[1], e2, 5.0).is_err());

        let g = b.freeze().unwrap();
        assert_eq!(g.turn_costs().get(slot, e0, n[1], e1), Some(f64::INFINITY));
        assert_eq!(g.turn_costs().get(slot, e1, n[1], e0), None);
    }

    #[test]
    fn test_sorted_freeze_remaps_consistently() {
        let mut b = builder();
        let slot = b.encoding().slot("p", "car").unwrap();
        // Chain built in scrambled order: 3 - 0 - 2 - 1
        let ids: Vec<_> = (0..4).map(|i| b.add_node(i as f64 * 0.01, 0.0).unwrap()).collect();
        let e0 = b.add_edge(ids[3], ids[0], 10.0, EdgeFlags::EMPTY).unwrap();
        let e1 = b.add_edge(ids[0], ids[2], 20.0, EdgeFlags::EMPTY).unwrap();
        b.add_edge(ids[2], ids[1], 30.0, EdgeFlags::EMPTY).unwrap();
        b.add_turn_cost(slot, e0, ids[0], e1, 3.0).unwrap();

        let (g, map) = b.freeze_sorted().unwrap();

        for old in 0..4u32 {
            let (lat, _) = g.coordinate(map[old as usize]);
            assert!((lat - old as f64 * 0.01).abs() < 1e-9);
        }
        let e = g.edge(e1);
        assert_eq!(e.base, map[0]);
        assert_eq!(e.adj, map[2]);
        assert_eq!(g.turn_costs().get(slot, e0, map[0], e1), Some(3.0));
    }
}
