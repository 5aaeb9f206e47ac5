//! graph.rg format - frozen routing graph
//!
//! Header, vehicle encoding, node columns, edge columns, pillar geometry,
//! turn cost entries, CRC-64 footer.

use std::path::Path;

use ridgeline_common::Result;

use super::storage::{self, Header};
use crate::graph::{EncodingManager, GraphParts, RoutingGraph, TurnKey, VehicleEncoding};

const HEADER: Header = Header::new(0x5247_4752, 1); // "RGGR"

pub struct GraphFile;

impl GraphFile {
    pub fn write(path: &Path, graph: &RoutingGraph) -> Result<()> {
        let parts = graph.parts();
        storage::write_atomic(path, |w| {
            HEADER.write(w)?;

            let vehicles = graph.encoding().vehicles();
            w.write_u8(vehicles.len() as u8)?;
            for v in vehicles {
                w.write_str(&v.name)?;
                w.write_u8(v.max_speed_kmh)?;
                w.write_bool(v.turn_costs)?;
            }

            w.write_i32_slice(&parts.lat_e7)?;
            w.write_i32_slice(&parts.lon_e7)?;
            w.write_u64(parts.elevation.len() as u64)?;
            for e in &parts.elevation {
                w.write_f32(*e)?;
            }

            w.write_u32_slice(&parts.edge_base)?;
            w.write_u32_slice(&parts.edge_adj)?;
            w.write_u32_slice(&parts.edge_length_mm)?;
            w.write_u64(parts.edge_flags.len() as u64)?;
            for f in &parts.edge_flags {
                w.write_u64(*f)?;
            }

            w.write_u32_slice(&parts.geo_offsets)?;
            w.write_i32_slice(&parts.geo_lat_e7)?;
            w.write_i32_slice(&parts.geo_lon_e7)?;

            let turns = parts.turn_costs.sorted_entries();
            w.write_u64(turns.len() as u64)?;
            for (key, cost) in turns {
                w.write_u8(key.vehicle)?;
                w.write_u32(key.from_edge)?;
                w.write_u32(key.via_node)?;
                w.write_u32(key.to_edge)?;
                w.write_f32(cost)?;
            }
            Ok(())
        })
    }

    /// Returns `None` when the file does not exist
    pub fn read(path: &Path) -> Result<Option<RoutingGraph>> {
        let Some(mut r) = storage::open(path)? else {
            return Ok(None);
        };
        HEADER.expect(&mut r)?;

        let n_vehicles = r.read_u8()?;
        let mut vehicles = Vec::with_capacity(n_vehicles as usize);
        for _ in 0..n_vehicles {
            let name = r.read_str()?;
            let max_speed_kmh = r.read_u8()?;
            let turn_costs = r.read_bool()?;
            vehicles.push(VehicleEncoding {
                name,
                max_speed_kmh,
                turn_costs,
            });
        }
        let encoding = EncodingManager::new(vehicles).map_err(|e| r.corrupt(e.to_string()))?;

        let mut parts = GraphParts {
            lat_e7: r.read_i32_vec()?,
            lon_e7: r.read_i32_vec()?,
            ..GraphParts::default()
        };
        let n_ele = r.read_u64()?;
        for _ in 0..n_ele {
            parts.elevation.push(r.read_f32()?);
        }

        parts.edge_base = r.read_u32_vec()?;
        parts.edge_adj = r.read_u32_vec()?;
        parts.edge_length_mm = r.read_u32_vec()?;
        let n_flags = r.read_u64()?;
        for _ in 0..n_flags {
            parts.edge_flags.push(r.read_u64()?);
        }

        parts.geo_offsets = r.read_u32_vec()?;
        parts.geo_lat_e7 = r.read_i32_vec()?;
        parts.geo_lon_e7 = r.read_i32_vec()?;

        let n_turns = r.read_u64()?;
        for _ in 0..n_turns {
            let key = TurnKey {
                vehicle: r.read_u8()?,
                from_edge: r.read_u32()?,
                via_node: r.read_u32()?,
                to_edge: r.read_u32()?,
            };
            let cost = r.read_f32()?;
            parts.turn_costs.insert(key, cost as f64);
        }
        r.finish()?;

        RoutingGraph::from_parts(encoding, parts).map(Some)
    }
}
