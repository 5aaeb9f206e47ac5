//! End-to-end: prepare into a directory, reload, and route through the public API

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ridgeline_common::{ConfigError, PointFailureReason, RouteError};
use ridgeline_route::formats::{GraphFile, StorageLock};
use ridgeline_route::graph::geometry::haversine_m;
use ridgeline_route::graph::{EdgeFlags, EncodingManager, VehicleEncoding};
use ridgeline_route::router::RouteResponse;
use ridgeline_route::{
    Algorithm, Engine, EngineConfig, GraphBuilder, RequestHints, RouteRequest, RoutingGraph,
};
use tempfile::TempDir;

const CONFIG: &str = r#"
[[profiles]]
name = "car"
vehicle = "car"
weighting = "shortest"

[[profiles]]
name = "car_tc"
vehicle = "car"
weighting = "fastest"
turn_costs = true

[ch]
profiles = [{ profile = "car" }, { profile = "car_tc" }]

[lm]
profiles = [{ profile = "car" }, { profile = "car_tc" }]
landmarks = 4
"#;

fn encoding() -> EncodingManager {
    EncodingManager::new(vec![VehicleEncoding::new("car", 140).with_turn_costs()]).unwrap()
}

/// Ring of `n` nodes; edges listed in `closed` get no access
fn ring(n: u32, closed: &[u32]) -> Arc<RoutingGraph> {
    let em = encoding();
    let slot = em.slot("test", "car").unwrap();
    let mut b = GraphBuilder::new(em);
    for i in 0..n {
        let angle = i as f64 / n as f64 * std::f64::consts::TAU;
        b.add_node(50.0 + 0.01 * angle.sin(), 4.0 + 0.01 * angle.cos()).unwrap();
    }
    for i in 0..n {
        let open = !closed.contains(&i);
        let flags = b.encoding().encode(EdgeFlags::EMPTY, slot, open, open, 50.0);
        b.add_edge(i, (i + 1) % n, 1.0, flags).unwrap();
    }
    Arc::new(b.freeze().unwrap())
}

fn grid(rows: u32, cols: u32, seed: u64) -> Arc<RoutingGraph> {
    let mut rng = StdRng::seed_from_u64(seed);
    let em = encoding();
    let slot = em.slot("test", "car").unwrap();
    let mut b = GraphBuilder::new(em);
    let coord = |node: u32| (50.0 + (node / cols) as f64 * 0.002, 4.0 + (node % cols) as f64 * 0.002);
    for node in 0..rows * cols {
        let (lat, lon) = coord(node);
        b.add_node(lat, lon).unwrap();
    }
    let mut pairs = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if c + 1 < cols {
                pairs.push((r * cols + c, r * cols + c + 1));
            }
            if r + 1 < rows {
                pairs.push((r * cols + c, (r + 1) * cols + c));
            }
        }
    }
    for (a, z) in pairs {
        let oneway = rng.random_range(0..8) == 0;
        let flags = b
            .encoding()
            .encode(EdgeFlags::EMPTY, slot, true, !oneway, rng.random_range(20.0..120.0));
        let ((lat_a, lon_a), (lat_z, lon_z)) = (coord(a), coord(z));
        let distance = haversine_m(lat_a, lon_a, lat_z, lon_z) * rng.random_range(1.02..1.5);
        b.add_edge(a, z, distance, flags).unwrap();
    }
    Arc::new(b.freeze().unwrap())
}

fn engine(graph: &Arc<RoutingGraph>, config: &str, dir: &Path) -> ridgeline_common::Result<Engine> {
    Engine::load_or_prepare(graph.clone(), EngineConfig::from_toml_str(config).unwrap(), dir)
}

fn request(profile: &str, graph: &RoutingGraph, from: u32, to: u32, hints: RequestHints) -> RouteRequest {
    RouteRequest {
        profile: profile.to_string(),
        points: vec![graph.coordinate(from), graph.coordinate(to)],
        hints,
    }
}

fn route(engine: &Engine, req: &RouteRequest) -> RouteResponse {
    engine.router().route(req).unwrap()
}

#[test]
fn test_all_algorithms_agree_on_ring() {
    let dir = TempDir::new().unwrap();
    let graph = ring(5, &[]);
    let engine = engine(&graph, CONFIG, dir.path()).unwrap();

    let ch = route(&engine, &request("car", &graph, 0, 3, RequestHints::default()));
    assert_eq!(ch.algorithm, "ch");
    assert_eq!(ch.weight, 2.0);
    assert_eq!(ch.distance_m, 2.0);

    let alt = route(
        &engine,
        &request("car", &graph, 0, 3, RequestHints { disable_ch: true, ..Default::default() }),
    );
    assert_eq!(alt.algorithm, "alt");
    assert_eq!(alt.weight, 2.0);

    let hints = RequestHints {
        algorithm: Some(Algorithm::Dijkstra),
        disable_lm: true,
        ..Default::default()
    };
    let dijkstra = route(&engine, &request("car", &graph, 0, 3, hints));
    assert_eq!(dijkstra.algorithm, "dijkstra");
    assert_eq!(dijkstra.weight, 2.0);
}

#[test]
fn test_modes_agree_on_grid() {
    let dir = TempDir::new().unwrap();
    let graph = grid(7, 7, 11);
    let engine = engine(&graph, CONFIG, dir.path()).unwrap();
    let bounds = graph.bounds();
    let mut rng = StdRng::seed_from_u64(3);

    for profile in ["car", "car_tc"] {
        for _ in 0..25 {
            let mut point = || {
                (
                    rng.random_range(bounds.min_lat..bounds.max_lat),
                    rng.random_range(bounds.min_lon..bounds.max_lon),
                )
            };
            let points = vec![point(), point(), point()];
            let run = |hints: RequestHints| {
                engine.router().route(&RouteRequest {
                    profile: profile.to_string(),
                    points: points.clone(),
                    hints,
                })
            };
            let ch = run(RequestHints::default());
            let alt = run(RequestHints { disable_ch: true, ..Default::default() });
            let astar = run(RequestHints {
                algorithm: Some(Algorithm::Astar),
                ..Default::default()
            });
            let dijkstra = run(RequestHints {
                disable_ch: true,
                disable_lm: true,
                ..Default::default()
            });
            match (ch, alt, astar, dijkstra) {
                (Ok(a), Ok(b), Ok(c), Ok(d)) => {
                    for res in [&a, &b, &c] {
                        assert_eq!(res.weight, d.weight, "{profile} {} {points:?}", res.algorithm);
                    }
                    assert_eq!(d.segments.len(), 2);
                }
                (Err(a), Err(b), Err(c), Err(d)) => {
                    for err in [a, b, c, d] {
                        assert!(matches!(err, RouteError::NoPath { .. }), "{err}");
                    }
                }
                (a, b, c, d) => panic!("modes disagree: {a:?} / {b:?} / {c:?} / {d:?}"),
            }
        }
    }
}

#[test]
fn test_closed_edge_forces_detour() {
    let dir = TempDir::new().unwrap();
    let graph = ring(5, &[1]);
    let engine = engine(&graph, CONFIG, dir.path()).unwrap();
    let res = route(&engine, &request("car", &graph, 0, 2, RequestHints::default()));
    assert_eq!(res.weight, 3.0);
}

#[test]
fn test_unreachable_target_is_no_path() {
    let dir = TempDir::new().unwrap();
    let em = encoding();
    let slot = em.slot("test", "car").unwrap();
    let mut b = GraphBuilder::new(em);
    for i in 0..4 {
        b.add_node(50.0, 4.0 + i as f64 * 0.001).unwrap();
    }
    let open = b.encoding().encode(EdgeFlags::EMPTY, slot, true, true, 50.0);
    let closed = b.encoding().encode(EdgeFlags::EMPTY, slot, false, false, 50.0);
    b.add_edge(0, 1, 70.0, open).unwrap();
    b.add_edge(1, 2, 70.0, closed).unwrap();
    b.add_edge(2, 3, 70.0, open).unwrap();
    let graph = Arc::new(b.freeze().unwrap());
    let engine = engine(&graph, CONFIG, dir.path()).unwrap();

    for hints in [
        RequestHints::default(),
        RequestHints { disable_ch: true, ..Default::default() },
    ] {
        let err = engine.router().route(&request("car", &graph, 0, 2, hints)).unwrap_err();
        assert!(matches!(err, RouteError::NoPath { from: 0, to: 1 }), "{err}");
    }
}

#[test]
fn test_reload_reuses_prepared_files() {
    let dir = TempDir::new().unwrap();
    let graph = grid(5, 5, 2);
    let req = request("car_tc", &graph, 0, 24, RequestHints::default());
    let first = route(&engine(&graph, CONFIG, dir.path()).unwrap(), &req);

    let modified = fs::metadata(dir.path().join("ch.car_tc")).unwrap().modified().unwrap();
    let graph_path = dir.path().join("graph.rg");
    GraphFile::write(&graph_path, &graph).unwrap();
    let reread = Arc::new(GraphFile::read(&graph_path).unwrap().unwrap());
    let second = route(&engine(&reread, CONFIG, dir.path()).unwrap(), &req);

    assert_eq!(first.weight, second.weight);
    assert_eq!(first.segments, second.segments);
    assert_eq!(
        fs::metadata(dir.path().join("ch.car_tc")).unwrap().modified().unwrap(),
        modified
    );
}

#[test]
fn test_changed_profile_is_stale_preparation() {
    let dir = TempDir::new().unwrap();
    let graph = ring(6, &[]);
    engine(&graph, CONFIG, dir.path()).unwrap();

    let changed = CONFIG.replace("turn_costs = true", "turn_costs = true\nu_turn_costs = 60.0");
    let err = engine(&graph, &changed, dir.path()).unwrap_err();
    assert!(
        matches!(err, RouteError::Configuration(ConfigError::StalePreparation { .. })),
        "{err}"
    );
    // the failed start released the lock
    StorageLock::acquire(dir.path()).unwrap();
}

#[test]
fn test_changed_landmark_parameters_are_stale_preparation() {
    let dir = TempDir::new().unwrap();
    let graph = ring(6, &[]);
    engine(&graph, CONFIG, dir.path()).unwrap();

    let changed = CONFIG.replace("landmarks = 4", "landmarks = 2");
    let err = engine(&graph, &changed, dir.path()).unwrap_err();
    assert!(
        matches!(err, RouteError::Configuration(ConfigError::StalePreparation { .. })),
        "{err}"
    );
}

#[test]
fn test_corrupt_file_is_storage_error() {
    let dir = TempDir::new().unwrap();
    let graph = ring(6, &[]);
    engine(&graph, CONFIG, dir.path()).unwrap();

    let path = dir.path().join("lm.car");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let err = engine(&graph, CONFIG, dir.path()).unwrap_err();
    assert!(matches!(err, RouteError::Storage { .. }), "{err}");
}

#[test]
fn test_held_lock_stops_startup() {
    let dir = TempDir::new().unwrap();
    let graph = ring(5, &[]);
    let _lock = StorageLock::acquire(dir.path()).unwrap();
    let err = engine(&graph, CONFIG, dir.path()).unwrap_err();
    assert!(matches!(err, RouteError::Configuration(ConfigError::LockHeld { .. })), "{err}");
}

#[test]
fn test_lock_left_by_dead_process_does_not_stop_startup() {
    let dir = TempDir::new().unwrap();
    let graph = ring(5, &[]);
    fs::write(dir.path().join("prepare.lock"), "4194303\n").unwrap();
    let engine = engine(&graph, CONFIG, dir.path()).unwrap();
    assert!(engine.router().ch("car").is_some());
    assert!(engine.router().landmarks("car").is_some());
}

#[test]
fn test_prepared_files_load_while_lock_is_held() {
    let dir = TempDir::new().unwrap();
    let graph = ring(5, &[]);
    engine(&graph, CONFIG, dir.path()).unwrap();

    let _lock = StorageLock::acquire(dir.path()).unwrap();
    let engine = engine(&graph, CONFIG, dir.path()).unwrap();
    let req = request("car", &graph, 0, 2, RequestHints::default());
    assert!(route(&engine, &req).distance_m > 0.0);
}

#[test]
fn test_point_failures_are_collected() {
    let dir = TempDir::new().unwrap();
    let graph = ring(5, &[]);
    let engine = engine(&graph, CONFIG, dir.path()).unwrap();
    let err = engine
        .router()
        .route(&RouteRequest {
            profile: "car".to_string(),
            points: vec![graph.coordinate(0), (10.0, 10.0), (f64::NAN, 4.0)],
            hints: RequestHints::default(),
        })
        .unwrap_err();
    let RouteError::PointResolution { failures } = err else {
        panic!("expected point resolution failure, got {err}");
    };
    let reasons: Vec<_> = failures.iter().map(|f| (f.index, f.reason)).collect();
    assert_eq!(
        reasons,
        vec![(1, PointFailureReason::NoMatch), (2, PointFailureReason::InvalidCoordinate)]
    );
}

#[test]
fn test_request_validation() {
    let dir = TempDir::new().unwrap();
    let graph = ring(5, &[]);
    let locked = format!("{CONFIG}\n[router]\nch_disabling_allowed = false\nlm_disabling_allowed = false\n");
    let engine = engine(&graph, &locked, dir.path()).unwrap();
    let router = engine.router();

    let cases = [
        RequestHints { disable_ch: true, ..Default::default() },
        RequestHints { algorithm: Some(Algorithm::Dijkstra), ..Default::default() },
        RequestHints { u_turn_costs: Some(10.0), ..Default::default() },
    ];
    for hints in cases {
        let err = router.route(&request("car_tc", &graph, 0, 2, hints)).unwrap_err();
        assert!(matches!(err, RouteError::InvalidRequest(_)), "{err}");
    }

    let single = RouteRequest {
        profile: "car".to_string(),
        points: vec![graph.coordinate(0)],
        hints: RequestHints::default(),
    };
    assert!(matches!(router.route(&single).unwrap_err(), RouteError::InvalidRequest(_)));

    let err = router
        .route(&request("bus", &graph, 0, 2, RequestHints::default()))
        .unwrap_err();
    assert!(
        matches!(err, RouteError::Configuration(ConfigError::UnknownProfile { .. })),
        "{err}"
    );
}

#[test]
fn test_visited_limit() {
    let dir = TempDir::new().unwrap();
    let graph = ring(8, &[]);
    let engine = engine(&graph, CONFIG, dir.path()).unwrap();
    let hints = RequestHints {
        algorithm: Some(Algorithm::Dijkstra),
        max_visited_nodes: Some(1),
        ..Default::default()
    };
    let err = engine
        .router()
        .route(&request("car", &graph, 0, 4, hints))
        .unwrap_err();
    assert!(matches!(err, RouteError::SearchLimit { limit: 1, .. }), "{err}");
}

#[test]
fn test_concurrent_queries() {
    let dir = TempDir::new().unwrap();
    let graph = grid(6, 6, 5);
    let engine = engine(&graph, CONFIG, dir.path()).unwrap();
    let req = request("car", &graph, 0, 35, RequestHints::default());
    let expected = route(&engine, &req);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..20 {
                    assert_eq!(route(&engine, &req).weight, expected.weight);
                }
            });
        }
    });
}

#[test]
fn test_clean_and_info() {
    let dir = TempDir::new().unwrap();
    let graph = ring(5, &[]);
    engine(&graph, CONFIG, dir.path()).unwrap();

    let names: Vec<_> = Engine::info(dir.path()).unwrap().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["ch.car", "ch.car_tc", "lm.car", "lm.car_tc", "location_index"]);
    let info = Engine::info(dir.path()).unwrap();
    assert_eq!(info[0].magic, "RGCH");
    assert_eq!(info[0].graph, graph.signature().hex());

    assert_eq!(Engine::clean(dir.path()).unwrap(), 5);
    assert!(Engine::info(dir.path()).unwrap().is_empty());
    engine(&graph, CONFIG, dir.path()).unwrap();
}
