//! Synthetic graphs shared by unit tests

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ProfileConfig, WeightingKind};
use crate::graph::{EdgeFlags, EncodingManager, GraphBuilder, RoutingGraph, VehicleEncoding};
use crate::weighting::{Weighting, WeightingFactory, WeightingHints};

pub fn car_encoding() -> EncodingManager {
    EncodingManager::new(vec![VehicleEncoding::new("car", 140).with_turn_costs()]).unwrap()
}

/// Ring of `n` nodes with two-way 1 m edges: every edge costs 1 under `shortest`
pub fn ring(n: u32) -> Arc<RoutingGraph> {
    let em = car_encoding();
    let slot = em.slot("test", "car").unwrap();
    let mut b = GraphBuilder::new(em);
    for i in 0..n {
        let angle = i as f64 / n as f64 * std::f64::consts::TAU;
        b.add_node(0.01 * angle.sin(), 0.01 * angle.cos()).unwrap();
    }
    let flags = b.encoding().encode(EdgeFlags::EMPTY, slot, true, true, 50.0);
    for i in 0..n {
        b.add_edge(i, (i + 1) % n, 1.0, flags).unwrap();
    }
    Arc::new(b.freeze().unwrap())
}

/// `rows` x `cols` grid around (50, 4) with random speeds, some oneways and
/// some closed edges; deterministic for a given seed
pub fn random_grid(rows: u32, cols: u32, seed: u64) -> Arc<RoutingGraph> {
    let mut rng = StdRng::seed_from_u64(seed);
    let em = car_encoding();
    let slot = em.slot("test", "car").unwrap();
    let mut b = GraphBuilder::new(em);
    let spacing = 0.002;
    for r in 0..rows {
        for c in 0..cols {
            b.add_node(50.0 + r as f64 * spacing, 4.0 + c as f64 * spacing).unwrap();
        }
    }
    let id = |r: u32, c: u32| r * cols + c;
    let add = |b: &mut GraphBuilder, rng: &mut StdRng, a: u32, z: u32| {
        let speed = rng.random_range(10.0..130.0);
        let (fwd, bwd) = match rng.random_range(0..10) {
            0 => (true, false),
            1 => (false, true),
            2 if rng.random_bool(0.3) => (false, false),
            _ => (true, true),
        };
        let (lat_a, lon_a) = b_coord(a, cols, spacing);
        let (lat_z, lon_z) = b_coord(z, cols, spacing);
        let beeline = crate::graph::geometry::haversine_m(lat_a, lon_a, lat_z, lon_z);
        let distance = beeline * rng.random_range(1.0..1.6);
        let flags = b.encoding().encode(EdgeFlags::EMPTY, slot, fwd, bwd, speed);
        b.add_edge(a, z, distance, flags).unwrap();
    };
    for r in 0..rows {
        for c in 0..cols {
            if c + 1 < cols {
                add(&mut b, &mut rng, id(r, c), id(r, c + 1));
            }
            if r + 1 < rows {
                add(&mut b, &mut rng, id(r, c), id(r + 1, c));
            }
        }
    }
    Arc::new(b.freeze().unwrap())
}

fn b_coord(node: u32, cols: u32, spacing: f64) -> (f64, f64) {
    (
        50.0 + (node / cols) as f64 * spacing,
        4.0 + (node % cols) as f64 * spacing,
    )
}

pub fn profile(kind: WeightingKind, turn_costs: bool) -> ProfileConfig {
    let p = ProfileConfig::new("test", "car", kind);
    if turn_costs {
        p.with_turn_costs(40.0)
    } else {
        p
    }
}

pub fn weighting(graph: &Arc<RoutingGraph>, profile: &ProfileConfig) -> Box<dyn Weighting> {
    WeightingFactory::new(graph.clone())
        .create(profile, &WeightingHints::default())
        .unwrap()
}
