//! Weightings - edge and turn costs for a routing profile
//!
//! A weighting turns an edge's distance and encoded flags into a traversal cost
//! per direction. `f64::INFINITY` means the edge (or turn) cannot be used.
//! Searches work on fixed-point [`Weight`]s with millisecond-like precision so
//! that shortcut sums and path sums agree exactly.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDateTime, Timelike};
use ridgeline_common::ConfigError;

use crate::config::{ProfileConfig, WeightingKind};
use crate::graph::{EdgeId, EdgeView, NodeId, RoutingGraph, VehicleSlot};

/// Fixed-point weight: 1/1000 of a weighting unit
pub type Weight = u64;

pub const WEIGHT_INFINITY: Weight = u64::MAX;
pub const WEIGHT_PRECISION: f64 = 1000.0;

pub fn to_weight(w: f64) -> Weight {
    if w.is_nan() || w >= WEIGHT_INFINITY as f64 / WEIGHT_PRECISION {
        return WEIGHT_INFINITY;
    }
    (w.max(0.0) * WEIGHT_PRECISION).round() as Weight
}

pub fn from_weight(w: Weight) -> f64 {
    if w == WEIGHT_INFINITY {
        f64::INFINITY
    } else {
        w as f64 / WEIGHT_PRECISION
    }
}

/// Cost model of one profile.
///
/// Implementations are immutable and shared between concurrent queries.
pub trait Weighting: Send + Sync + fmt::Debug {
    /// Identifier stored with prepared data, e.g. `fastest|car`
    fn name(&self) -> &str;

    /// Cost of traversing `edge`; `reverse` walks it adj → base
    fn edge_weight(&self, edge: &EdgeView, reverse: bool) -> f64;

    /// Cost of turning from `from_edge` onto `to_edge` at `via`
    fn turn_weight(&self, _from_edge: EdgeId, _via: NodeId, _to_edge: EdgeId) -> f64 {
        0.0
    }

    fn has_turn_costs(&self) -> bool {
        false
    }

    /// Lower bound of the cost of one meter of beeline distance
    fn min_weight_per_meter(&self) -> f64;

    /// Check that every encoded value this weighting reads exists in `graph`
    fn validate(&self, graph: &RoutingGraph) -> Result<(), ConfigError>;
}

/// Fixed-point edge weight, `WEIGHT_INFINITY` when inaccessible
pub fn edge_weight(weighting: &dyn Weighting, graph: &RoutingGraph, edge: EdgeId, reverse: bool) -> Weight {
    to_weight(weighting.edge_weight(&graph.edge(edge), reverse))
}

/// Turn cost lookup for edge-based profiles
#[derive(Clone)]
pub struct TurnCostProvider {
    graph: Arc<RoutingGraph>,
    slot: VehicleSlot,
    u_turn_cost: f64,
}

impl fmt::Debug for TurnCostProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnCostProvider")
            .field("slot", &self.slot)
            .field("u_turn_cost", &self.u_turn_cost)
            .field("entries", &self.graph.turn_costs().len())
            .finish()
    }
}

impl TurnCostProvider {
    pub fn new(graph: Arc<RoutingGraph>, slot: VehicleSlot, u_turn_cost: f64) -> Self {
        Self {
            graph,
            slot,
            u_turn_cost,
        }
    }

    pub fn turn_cost(&self, from_edge: EdgeId, via: NodeId, to_edge: EdgeId) -> f64 {
        if from_edge == to_edge {
            return self.u_turn_cost;
        }
        self.graph
            .turn_costs()
            .get(self.slot, from_edge, via, to_edge)
            .unwrap_or(0.0)
    }
}

fn check_vehicle(
    graph: &RoutingGraph,
    name: &str,
    vehicle: &str,
    slot: VehicleSlot,
    needs_turn_costs: bool,
) -> Result<(), ConfigError> {
    let unavailable = |reason: String| ConfigError::WeightingUnavailable {
        weighting: name.to_string(),
        reason,
    };
    let found = graph
        .encoding()
        .slot(name, vehicle)
        .map_err(|_| unavailable(format!("vehicle '{vehicle}' is not encoded")))?;
    if found != slot {
        return Err(unavailable(format!(
            "vehicle '{vehicle}' is encoded in slot {} instead of {}",
            found.index(),
            slot.index()
        )));
    }
    if needs_turn_costs && !graph.encoding().vehicle(slot).turn_costs {
        return Err(unavailable(format!("vehicle '{vehicle}' has no turn costs")));
    }
    Ok(())
}

/// Travel time in seconds from the encoded speed
#[derive(Debug, Clone)]
pub struct FastestWeighting {
    name: String,
    vehicle: String,
    slot: VehicleSlot,
    max_speed_kmh: f64,
    turn_costs: Option<TurnCostProvider>,
}

impl FastestWeighting {
    pub fn new(vehicle: &str, slot: VehicleSlot, max_speed_kmh: f64, turn_costs: Option<TurnCostProvider>) -> Self {
        Self {
            name: format!("fastest|{vehicle}"),
            vehicle: vehicle.to_string(),
            slot,
            max_speed_kmh: max_speed_kmh.max(1.0),
            turn_costs,
        }
    }
}

impl Weighting for FastestWeighting {
    fn name(&self) -> &str {
        &self.name
    }

    fn edge_weight(&self, edge: &EdgeView, reverse: bool) -> f64 {
        if !edge.flags.access(self.slot, reverse) {
            return f64::INFINITY;
        }
        let speed = edge.flags.speed_kmh(self.slot);
        if speed == 0 {
            return f64::INFINITY;
        }
        edge.distance_m * 3.6 / speed as f64
    }

    fn turn_weight(&self, from_edge: EdgeId, via: NodeId, to_edge: EdgeId) -> f64 {
        self.turn_costs
            .as_ref()
            .map_or(0.0, |t| t.turn_cost(from_edge, via, to_edge))
    }

    fn has_turn_costs(&self) -> bool {
        self.turn_costs.is_some()
    }

    fn min_weight_per_meter(&self) -> f64 {
        3.6 / self.max_speed_kmh
    }

    fn validate(&self, graph: &RoutingGraph) -> Result<(), ConfigError> {
        check_vehicle(graph, &self.name, &self.vehicle, self.slot, self.turn_costs.is_some())
    }
}

/// Distance in meters on accessible edges
#[derive(Debug, Clone)]
pub struct ShortestWeighting {
    name: String,
    vehicle: String,
    slot: VehicleSlot,
    turn_costs: Option<TurnCostProvider>,
}

impl ShortestWeighting {
    pub fn new(vehicle: &str, slot: VehicleSlot, turn_costs: Option<TurnCostProvider>) -> Self {
        Self {
            name: format!("shortest|{vehicle}"),
            vehicle: vehicle.to_string(),
            slot,
            turn_costs,
        }
    }
}

impl Weighting for ShortestWeighting {
    fn name(&self) -> &str {
        &self.name
    }

    fn edge_weight(&self, edge: &EdgeView, reverse: bool) -> f64 {
        if edge.flags.access(self.slot, reverse) {
            edge.distance_m
        } else {
            f64::INFINITY
        }
    }

    fn turn_weight(&self, from_edge: EdgeId, via: NodeId, to_edge: EdgeId) -> f64 {
        self.turn_costs
            .as_ref()
            .map_or(0.0, |t| t.turn_cost(from_edge, via, to_edge))
    }

    fn has_turn_costs(&self) -> bool {
        self.turn_costs.is_some()
    }

    fn min_weight_per_meter(&self) -> f64 {
        1.0
    }

    fn validate(&self, graph: &RoutingGraph) -> Result<(), ConfigError> {
        check_vehicle(graph, &self.name, &self.vehicle, self.slot, self.turn_costs.is_some())
    }
}

/// Scales an inner weighting's edge costs by the slowdown factor of the
/// departure hour. Factors are at least 1, so landmark bounds computed for the
/// inner weighting stay admissible.
#[derive(Debug)]
pub struct TimeDependentWeighting {
    inner: Box<dyn Weighting>,
    name: String,
    factor: f64,
}

impl TimeDependentWeighting {
    pub fn new(inner: Box<dyn Weighting>, hourly_factors: &[f64], departure: NaiveDateTime) -> Self {
        let factor = hourly_factors
            .get(departure.hour() as usize)
            .copied()
            .unwrap_or(1.0)
            .max(1.0);
        let name = format!("{}@{:02}h", inner.name(), departure.hour());
        Self { inner, name, factor }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl Weighting for TimeDependentWeighting {
    fn name(&self) -> &str {
        &self.name
    }

    fn edge_weight(&self, edge: &EdgeView, reverse: bool) -> f64 {
        self.inner.edge_weight(edge, reverse) * self.factor
    }

    fn turn_weight(&self, from_edge: EdgeId, via: NodeId, to_edge: EdgeId) -> f64 {
        self.inner.turn_weight(from_edge, via, to_edge)
    }

    fn has_turn_costs(&self) -> bool {
        self.inner.has_turn_costs()
    }

    fn min_weight_per_meter(&self) -> f64 {
        self.inner.min_weight_per_meter() * self.factor
    }

    fn validate(&self, graph: &RoutingGraph) -> Result<(), ConfigError> {
        self.inner.validate(graph)
    }
}

/// Request-time adjustments to a profile's weighting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightingHints {
    pub u_turn_costs: Option<f64>,
    pub departure: Option<NaiveDateTime>,
}

impl WeightingHints {
    /// Whether the resulting weighting differs from the prepared one
    pub fn modifies_weighting(&self) -> bool {
        self.u_turn_costs.is_some() || self.departure.is_some()
    }
}

/// Builds weightings from profiles
pub struct WeightingFactory {
    graph: Arc<RoutingGraph>,
}

impl WeightingFactory {
    pub fn new(graph: Arc<RoutingGraph>) -> Self {
        Self { graph }
    }

    pub fn create(&self, profile: &ProfileConfig, hints: &WeightingHints) -> Result<Box<dyn Weighting>, ConfigError> {
        let u_turn = hints.u_turn_costs.unwrap_or(profile.u_turn_costs);
        let base = self.create_base(profile, profile.turn_costs, u_turn)?;
        match (hints.departure, &profile.hourly_factors) {
            (Some(departure), Some(factors)) => Ok(Box::new(TimeDependentWeighting::new(base, factors, departure))),
            (Some(_), None) => Err(ConfigError::InvalidParameter {
                key: format!("profiles.{}.hourly_factors", profile.name),
                reason: "a departure time was given but the profile has no hourly factors".to_string(),
            }),
            (None, _) => Ok(base),
        }
    }

    /// Landmark weightings never include turn costs
    pub fn create_for_landmarks(&self, profile: &ProfileConfig) -> Result<Box<dyn Weighting>, ConfigError> {
        self.create_base(profile, false, 0.0)
    }

    fn create_base(
        &self,
        profile: &ProfileConfig,
        turn_costs: bool,
        u_turn_cost: f64,
    ) -> Result<Box<dyn Weighting>, ConfigError> {
        let encoding = self.graph.encoding();
        let slot = encoding.slot(&profile.name, &profile.vehicle)?;
        let turns = if turn_costs {
            if !encoding.vehicle(slot).turn_costs {
                return Err(ConfigError::TurnCostsUnsupported {
                    profile: profile.name.clone(),
                    vehicle: profile.vehicle.clone(),
                });
            }
            Some(TurnCostProvider::new(self.graph.clone(), slot, u_turn_cost))
        } else {
            None
        };
        let weighting: Box<dyn Weighting> = match profile.weighting {
            WeightingKind::Fastest => Box::new(FastestWeighting::new(
                &profile.vehicle,
                slot,
                encoding.vehicle(slot).max_speed_kmh as f64,
                turns,
            )),
            WeightingKind::Shortest => Box::new(ShortestWeighting::new(&profile.vehicle, slot, turns)),
        };
        Ok(weighting)
    }
}
