//! Per-request routing
//!
//! The router owns the prepared structures of every profile and picks, per
//! request, the fastest search the request allows: the hierarchy, then
//! landmarks, then plain Dijkstra. Each leg between consecutive points is
//! searched on its own and also compared with a connection that never leaves
//! the snapped edge.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use ridgeline_common::{PointFailure, Result, RouteError};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ch::{ChGraph, ChQuery};
use crate::config::{EngineConfig, ProfileConfig};
use crate::graph::{EdgeId, RoutingGraph};
use crate::index::{LocationIndex, Snap};
use crate::lm::{LandmarkApproximator, LandmarkStorage};
use crate::search::endpoints::{direct_connection, source_seeds, target_seeds};
use crate::search::{
    AStar, Approximator, BeelineApproximator, EdgeBasedGraph, NodeBasedGraph, PathEdge, SearchOutcome, Seed,
    StateGraph, ZeroApproximator,
};
use crate::weighting::{edge_weight, from_weight, Weight, Weighting, WeightingFactory, WeightingHints, WEIGHT_INFINITY};

/// Search used when the hierarchy is not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Dijkstra,
    /// A* with a great-circle heuristic
    Astar,
    /// A* with landmarks
    Alt,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestHints {
    pub disable_ch: bool,
    pub disable_lm: bool,
    pub algorithm: Option<Algorithm>,
    /// Lower the configured visited-node budget for this request
    pub max_visited_nodes: Option<usize>,
    pub u_turn_costs: Option<f64>,
    pub departure: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub profile: String,
    /// (lat, lon), at least two
    pub points: Vec<(f64, f64)>,
    pub hints: RequestHints,
}

/// One leg between two consecutive request points
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
    pub distance_m: f64,
    pub visited: usize,
    pub edges: Vec<PathEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResponse {
    pub profile: String,
    pub algorithm: &'static str,
    pub weight: f64,
    pub distance_m: f64,
    pub visited: usize,
    pub snapped: Vec<Snap>,
    pub segments: Vec<Segment>,
}

/// Prepared structures by profile name
#[derive(Debug, Clone, Default)]
pub struct Preparations {
    pub ch: FxHashMap<String, Arc<ChGraph>>,
    /// Profiles that reuse another profile's landmarks share its storage
    pub lm: FxHashMap<String, Arc<LandmarkStorage>>,
}

enum Mode<'a> {
    Hierarchy(&'a ChGraph),
    Flexible(Algorithm, Option<&'a LandmarkStorage>),
}

impl Mode<'_> {
    fn name(&self) -> &'static str {
        match self {
            Mode::Hierarchy(_) => "ch",
            Mode::Flexible(Algorithm::Dijkstra, _) => "dijkstra",
            Mode::Flexible(Algorithm::Astar, _) => "astar",
            Mode::Flexible(Algorithm::Alt, _) => "alt",
        }
    }
}

/// Heuristic chosen for one leg
enum Heuristic<'a> {
    Zero(ZeroApproximator),
    Beeline(BeelineApproximator<'a>),
    Landmarks(LandmarkApproximator<'a>),
}

impl Approximator for Heuristic<'_> {
    fn approximate(&self, node: u32) -> Weight {
        match self {
            Heuristic::Zero(a) => a.approximate(node),
            Heuristic::Beeline(a) => a.approximate(node),
            Heuristic::Landmarks(a) => a.approximate(node),
        }
    }
}

pub struct Router {
    graph: Arc<RoutingGraph>,
    config: EngineConfig,
    preparations: Preparations,
    index: LocationIndex,
    weightings: WeightingFactory,
}

impl Router {
    pub fn new(graph: Arc<RoutingGraph>, config: EngineConfig, preparations: Preparations, index: LocationIndex) -> Self {
        Self {
            weightings: WeightingFactory::new(graph.clone()),
            graph,
            config,
            preparations,
            index,
        }
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &LocationIndex {
        &self.index
    }

    pub fn ch(&self, profile: &str) -> Option<&ChGraph> {
        self.preparations.ch.get(profile).map(Arc::as_ref)
    }

    pub fn landmarks(&self, profile: &str) -> Option<&LandmarkStorage> {
        self.preparations.lm.get(profile).map(Arc::as_ref)
    }

    pub fn route(&self, request: &RouteRequest) -> Result<RouteResponse> {
        let start = Instant::now();
        let profile = self.config.profile(&request.profile)?;
        if request.points.len() < 2 {
            return Err(RouteError::InvalidRequest(format!(
                "at least two points are required, got {}",
                request.points.len()
            )));
        }
        let hints = &request.hints;
        let weighting_hints = WeightingHints {
            u_turn_costs: hints.u_turn_costs,
            departure: hints.departure,
        };
        let weighting = self.weightings.create(profile, &weighting_hints)?;
        let mode = self.select_mode(profile, hints, weighting_hints.modifies_weighting())?;
        let limit = match (self.config.router.max_visited_nodes, hints.max_visited_nodes) {
            (Some(a), Some(b)) => a.min(b),
            (a, b) => a.or(b).unwrap_or(usize::MAX),
        };

        let snapped = self.resolve_points(&request.points, weighting.as_ref())?;

        let mut segments = Vec::with_capacity(snapped.len() - 1);
        for (i, pair) in snapped.windows(2).enumerate() {
            segments.push(self.route_leg(profile, weighting.as_ref(), &mode, limit, (i, &pair[0]), (i + 1, &pair[1]))?);
        }

        let response = RouteResponse {
            profile: profile.name.clone(),
            algorithm: mode.name(),
            weight: segments.iter().map(|s| s.weight).sum(),
            distance_m: segments.iter().map(|s| s.distance_m).sum(),
            visited: segments.iter().map(|s| s.visited).sum(),
            snapped,
            segments,
        };
        debug!(
            profile = %profile.name,
            algorithm = response.algorithm,
            visited = response.visited,
            elapsed_us = start.elapsed().as_micros() as u64,
            "route"
        );
        Ok(response)
    }

    fn select_mode(&self, profile: &ProfileConfig, hints: &RequestHints, modified: bool) -> Result<Mode<'_>> {
        let ch = self.ch(&profile.name);
        let lm = self.landmarks(&profile.name);
        // the hierarchy is static: another algorithm or a changed weighting bypasses it
        let bypass_ch = hints.disable_ch || hints.algorithm.is_some() || modified;
        if let Some(ch) = ch {
            if !bypass_ch {
                return Ok(Mode::Hierarchy(ch));
            }
            if !self.config.router.ch_disabling_allowed {
                return Err(RouteError::InvalidRequest(
                    "disabling the hierarchy is not allowed on this server".to_string(),
                ));
            }
        }
        if hints.disable_lm && lm.is_some() && !self.config.router.lm_disabling_allowed {
            return Err(RouteError::InvalidRequest(
                "disabling landmarks is not allowed on this server".to_string(),
            ));
        }

        let lm = lm.filter(|_| !hints.disable_lm);
        match hints.algorithm {
            Some(Algorithm::Alt) if lm.is_none() => Err(RouteError::InvalidRequest(format!(
                "no landmarks available for profile '{}'",
                profile.name
            ))),
            Some(algorithm) => Ok(Mode::Flexible(algorithm, lm)),
            None if lm.is_some() => Ok(Mode::Flexible(Algorithm::Alt, lm)),
            None => Ok(Mode::Flexible(Algorithm::Dijkstra, None)),
        }
    }

    /// Snap every point; failures are collected for all points before reporting
    fn resolve_points(&self, points: &[(f64, f64)], weighting: &dyn Weighting) -> Result<Vec<Snap>> {
        let graph = self.graph.as_ref();
        let accessible = |e: EdgeId| {
            edge_weight(weighting, graph, e, false) != WEIGHT_INFINITY
                || edge_weight(weighting, graph, e, true) != WEIGHT_INFINITY
        };
        let mut snapped = Vec::with_capacity(points.len());
        let mut failures = Vec::new();
        for (index, &(lat, lon)) in points.iter().enumerate() {
            match self.index.nearest(graph, lat, lon, &accessible) {
                Ok(snap) => snapped.push(snap),
                Err(reason) => failures.push(PointFailure {
                    index,
                    lat,
                    lon,
                    reason,
                }),
            }
        }
        if failures.is_empty() {
            Ok(snapped)
        } else {
            Err(RouteError::PointResolution { failures })
        }
    }

    fn route_leg(
        &self,
        profile: &ProfileConfig,
        weighting: &dyn Weighting,
        mode: &Mode<'_>,
        limit: usize,
        (from, from_snap): (usize, &Snap),
        (to, to_snap): (usize, &Snap),
    ) -> Result<Segment> {
        let graph = self.graph.as_ref();
        let edge_based = weighting.has_turn_costs();
        let sources = source_seeds(graph, weighting, from_snap.location, edge_based);
        let targets = target_seeds(graph, weighting, to_snap.location, edge_based);

        let outcome = match mode {
            Mode::Hierarchy(ch) => {
                let expected = if ch.is_edge_based() {
                    graph.edge_count() * 2
                } else {
                    graph.node_count()
                };
                if ch.state_count() != expected || ch.is_edge_based() != edge_based {
                    return Err(RouteError::InternalConsistency {
                        profile: profile.name.clone(),
                        detail: format!(
                            "hierarchy covers {} states, graph has {expected}",
                            ch.state_count()
                        ),
                    });
                }
                ChQuery::new(ch).with_max_visited(limit).route(&sources, &targets)?
            }
            Mode::Flexible(algorithm, lm) => {
                if let Some(lm) = lm {
                    if lm.node_count() != graph.node_count() {
                        return Err(RouteError::InternalConsistency {
                            profile: profile.name.clone(),
                            detail: format!(
                                "landmark tables cover {} nodes, graph has {}",
                                lm.node_count(),
                                graph.node_count()
                            ),
                        });
                    }
                }
                if edge_based {
                    let states = EdgeBasedGraph::new(graph, weighting);
                    self.flexible(&states, weighting, *algorithm, *lm, limit, &sources, &targets)
                } else {
                    let states = NodeBasedGraph::new(graph, weighting);
                    self.flexible(&states, weighting, *algorithm, *lm, limit, &sources, &targets)
                }
            }
        };

        let direct = direct_connection(graph, weighting, from_snap.location, to_snap.location);
        let (weight, edges, visited) = match (outcome, direct) {
            (SearchOutcome::Found(path), Some((w, edges))) if w <= path.weight => (w, edges, path.visited),
            (SearchOutcome::Found(path), _) => (path.weight, path.edges(&sources, &targets), path.visited),
            (SearchOutcome::NoPath { visited }, Some((w, edges)))
            | (SearchOutcome::LimitExceeded { visited }, Some((w, edges)))
                if w != WEIGHT_INFINITY =>
            {
                (w, edges, visited)
            }
            (SearchOutcome::LimitExceeded { visited }, _) => {
                return Err(RouteError::SearchLimit { visited, limit });
            }
            (SearchOutcome::NoPath { .. }, _) => return Err(RouteError::NoPath { from, to }),
        };

        Ok(Segment {
            from,
            to,
            weight: from_weight(weight),
            distance_m: edges.iter().map(|e| e.distance_m(graph)).sum(),
            visited,
            edges,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn flexible<G: StateGraph>(
        &self,
        states: &G,
        weighting: &dyn Weighting,
        algorithm: Algorithm,
        lm: Option<&LandmarkStorage>,
        limit: usize,
        sources: &[Seed],
        targets: &[Seed],
    ) -> SearchOutcome {
        let exits: Vec<(u32, Weight)> = targets
            .iter()
            .filter(|t| t.weight != WEIGHT_INFINITY)
            .map(|t| (states.node_of(t.state), t.weight))
            .collect();
        let heuristic = match (algorithm, lm, sources.first()) {
            (Algorithm::Alt, Some(lm), Some(source)) => Heuristic::Landmarks(LandmarkApproximator::new(
                lm,
                states.node_of(source.state),
                &exits,
                self.config.lm.active_landmarks(),
            )),
            (Algorithm::Astar, _, _) => Heuristic::Beeline(BeelineApproximator::new(&self.graph, weighting, &exits)),
            _ => Heuristic::Zero(ZeroApproximator),
        };
        AStar::new(states, &heuristic)
            .with_max_visited(limit)
            .route(sources, targets)
    }
}
