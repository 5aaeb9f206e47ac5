//! Landmarks for ALT (A*, landmarks, triangle inequality)
//!
//! Preparation picks a few landmark nodes per subnetwork and stores the
//! quantized distance from and to each of them for every node. At query time
//! [`LandmarkApproximator`] turns those tables into lower bounds for A*.
//! Distances are always computed without turn costs; the bounds then stay
//! admissible for edge-based searches of the same weighting.

mod approximator;
mod preparation;
mod storage;
mod subnetworks;

pub use approximator::LandmarkApproximator;
pub use preparation::LandmarkPreparation;
pub use storage::{quantize, LandmarkStorage, INFINITE, MAX_QUANTIZED, NO_SUBNETWORK, SATURATED};
pub use subnetworks::{find_subnetworks, RegionLookup};

use ridgeline_common::Result;

use crate::config::LmSection;
use crate::graph::RoutingGraph;
use crate::weighting::Weighting;

/// Prepare the landmark tables of one profile with a turn-cost-free weighting
pub fn prepare(
    profile: &str,
    graph: &RoutingGraph,
    weighting: &dyn Weighting,
    section: &LmSection,
    maximum_weight: Option<f64>,
) -> Result<LandmarkStorage> {
    LandmarkPreparation::new(profile, graph, weighting, section)
        .with_maximum_weight(maximum_weight)
        .run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightingKind;
    use crate::search::endpoints::{source_seeds, target_seeds};
    use crate::search::{shortest_path_tree, AStar, Location, NodeBasedGraph, SearchOutcome, ZeroApproximator};
    use crate::testing::{profile, random_grid, ring, weighting};
    use crate::weighting::{Weight, WEIGHT_INFINITY};
    use proptest::prelude::*;
    use ridgeline_common::{ConfigError, RouteError};
    use std::collections::HashSet;

    fn section(landmarks: usize) -> LmSection {
        LmSection {
            landmarks,
            ..LmSection::default()
        }
    }

    fn route<A: crate::search::Approximator>(
        g: &RoutingGraph,
        w: &dyn Weighting,
        approx: &A,
        from: u32,
        to: u32,
    ) -> Weight {
        let sources = source_seeds(g, w, Location::Node { node: from }, false);
        let targets = target_seeds(g, w, Location::Node { node: to }, false);
        match AStar::new(&NodeBasedGraph::new(g, w), approx).route(&sources, &targets) {
            SearchOutcome::Found(p) => p.weight,
            _ => WEIGHT_INFINITY,
        }
    }

    #[test]
    fn test_landmark_count_is_capped_by_subnetwork_size() {
        let g = ring(5);
        let w = weighting(&g, &profile(WeightingKind::Shortest, false));
        let lm = prepare("test", &g, w.as_ref(), &section(16), None).unwrap();
        assert_eq!(lm.subnetwork_count(), 2);
        let chosen = lm.landmarks(1);
        assert_eq!(chosen.len(), 5);
        assert_eq!(chosen.iter().collect::<HashSet<_>>().len(), 5);

        let lm = prepare("test", &g, w.as_ref(), &section(2), None).unwrap();
        assert_eq!(lm.landmarks(1).len(), 2);
        assert_ne!(lm.landmarks(1)[0], lm.landmarks(1)[1]);
    }

    #[test]
    fn test_same_seed_same_tables() {
        let g = random_grid(5, 5, 21);
        let w = weighting(&g, &profile(WeightingKind::Fastest, false));
        let a = prepare("test", &g, w.as_ref(), &section(4), None).unwrap();
        let b = prepare("test", &g, w.as_ref(), &section(4), None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_start_node_spreads_landmarks() {
        // line 0 - 1 - 2 - 3 - 4 - 5 as part of the ring: from 0 the farthest is 3
        let g = ring(6);
        let w = weighting(&g, &profile(WeightingKind::Shortest, false));
        let s = section(2);
        let lm = LandmarkPreparation::new("test", &g, w.as_ref(), &s)
            .with_start_node(0)
            .run()
            .unwrap();
        assert_eq!(lm.landmarks(1)[0], 3);
        assert_eq!(lm.landmarks(1)[1], 0);
    }

    #[test]
    fn test_unknown_start_node_falls_back_to_seed() {
        let g = ring(6);
        let w = weighting(&g, &profile(WeightingKind::Shortest, false));
        let s = section(2);
        let seeded = LandmarkPreparation::new("test", &g, w.as_ref(), &s).run().unwrap();
        let out_of_range = LandmarkPreparation::new("test", &g, w.as_ref(), &s)
            .with_start_node(1_000)
            .run()
            .unwrap();
        assert_eq!(seeded, out_of_range);
    }

    #[test]
    fn test_alt_on_ring() {
        let g = ring(5);
        let w = weighting(&g, &profile(WeightingKind::Shortest, false));
        let lm = prepare("test", &g, w.as_ref(), &section(2), None).unwrap();
        let approx = LandmarkApproximator::new(&lm, 0, &[(3, 0)], 2);
        assert_eq!(route(&g, w.as_ref(), &approx, 0, 3), 2_000);
    }

    #[test]
    fn test_turn_cost_weighting_rejected() {
        let g = ring(4);
        let w = weighting(&g, &profile(WeightingKind::Fastest, true));
        let err = prepare("test", &g, w.as_ref(), &section(2), None).unwrap_err();
        assert!(matches!(
            err,
            RouteError::Configuration(ConfigError::WeightingUnavailable { .. })
        ));
    }

    #[test]
    fn test_small_maximum_weight_saturates_but_stays_admissible() {
        let g = random_grid(4, 4, 5);
        let w = weighting(&g, &profile(WeightingKind::Fastest, false));
        let lm = prepare("test", &g, w.as_ref(), &section(3), Some(1.0)).unwrap();
        assert!(lm.from.iter().any(|&q| q == SATURATED));
        for n in 0..g.node_count() as u32 {
            let dist = shortest_path_tree(&NodeBasedGraph::new(&g, w.as_ref()), &[n], |_| true);
            for t in 0..g.node_count() as u32 {
                for i in 0..lm.landmarks(lm.subnetwork(n)).len() {
                    if dist[t as usize] != WEIGHT_INFINITY && lm.subnetwork(t) == lm.subnetwork(n) {
                        assert!(lm.bound(n, t, i) <= dist[t as usize]);
                    }
                }
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10))]

        #[test]
        fn prop_bounds_never_overestimate(seed in 0u64..1000) {
            let g = random_grid(4, 5, seed);
            let w = weighting(&g, &profile(WeightingKind::Fastest, false));
            let lm = prepare("test", &g, w.as_ref(), &section(4), None).unwrap();
            let forward = NodeBasedGraph::new(&g, w.as_ref());
            for n in 0..g.node_count() as u32 {
                let dist = shortest_path_tree(&forward, &[n], |_| true);
                let sub = lm.subnetwork(n);
                for t in 0..g.node_count() as u32 {
                    if dist[t as usize] == WEIGHT_INFINITY || sub == NO_SUBNETWORK || lm.subnetwork(t) != sub {
                        continue;
                    }
                    for i in 0..lm.landmarks(sub).len() {
                        prop_assert!(lm.bound(n, t, i) <= dist[t as usize], "{} -> {} via {}", n, t, i);
                    }
                }
            }
        }

        #[test]
        fn prop_alt_matches_dijkstra(seed in 0u64..1000, pairs in prop::collection::vec((0u32..20, 0u32..20), 6)) {
            let g = random_grid(4, 5, seed);
            let w = weighting(&g, &profile(WeightingKind::Fastest, false));
            let lm = prepare("test", &g, w.as_ref(), &section(4), None).unwrap();
            for (s, t) in pairs {
                let approx = LandmarkApproximator::new(&lm, s, &[(t, 0)], 2);
                prop_assert_eq!(
                    route(&g, w.as_ref(), &approx, s, t),
                    route(&g, w.as_ref(), &ZeroApproximator, s, t),
                    "{} -> {}", s, t
                );
            }
        }
    }
}
