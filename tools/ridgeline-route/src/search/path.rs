//! Path edges - base edges or partial pieces of an edge at a snapped endpoint

use serde::Serialize;

use crate::graph::{EdgeId, RoutingGraph};
use crate::weighting::Weighting;

/// An edge on a returned path.
///
/// `Virtual` covers the part of an original edge between a snapped point and
/// a tower node (or between two snapped points). Fractions are measured along
/// the stored base → adj direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathEdge {
    Base {
        edge: EdgeId,
        reverse: bool,
    },
    Virtual {
        original_edge: EdgeId,
        reverse: bool,
        from_fraction: f64,
        to_fraction: f64,
    },
}

impl PathEdge {
    /// Directed edge label `edge * 2 + reverse` as used by searches
    pub fn from_label(label: u32) -> Self {
        PathEdge::Base {
            edge: label >> 1,
            reverse: label & 1 == 1,
        }
    }

    pub fn original_edge(&self) -> EdgeId {
        match *self {
            PathEdge::Base { edge, .. } => edge,
            PathEdge::Virtual { original_edge, .. } => original_edge,
        }
    }

    pub fn reverse(&self) -> bool {
        match *self {
            PathEdge::Base { reverse, .. } | PathEdge::Virtual { reverse, .. } => reverse,
        }
    }

    /// Share of the original edge that this piece covers
    pub fn share(&self) -> f64 {
        match *self {
            PathEdge::Base { .. } => 1.0,
            PathEdge::Virtual {
                from_fraction,
                to_fraction,
                ..
            } => (to_fraction - from_fraction).abs(),
        }
    }

    pub fn distance_m(&self, graph: &RoutingGraph) -> f64 {
        graph.edge(self.original_edge()).distance_m * self.share()
    }

    pub fn weight(&self, graph: &RoutingGraph, weighting: &dyn Weighting) -> f64 {
        weighting.edge_weight(&graph.edge(self.original_edge()), self.reverse()) * self.share()
    }

    /// Points of this piece in travel order
    pub fn points(&self, graph: &RoutingGraph) -> Vec<(f64, f64)> {
        let geometry = graph.geometry(self.original_edge());
        let (from, to) = match *self {
            PathEdge::Base { reverse: false, .. } => (0.0, 1.0),
            PathEdge::Base { reverse: true, .. } => (1.0, 0.0),
            PathEdge::Virtual {
                from_fraction,
                to_fraction,
                ..
            } => (from_fraction, to_fraction),
        };
        slice_polyline(&geometry, from, to)
    }
}

/// Cut a polyline between two length fractions, keeping inner vertices.
/// `from > to` yields the slice in reverse.
pub fn slice_polyline(points: &[(f64, f64)], from: f64, to: f64) -> Vec<(f64, f64)> {
    if points.len() < 2 {
        return points.to_vec();
    }
    let (lo, hi, reversed) = if from <= to { (from, to, false) } else { (to, from, true) };

    let lengths: Vec<f64> = points
        .windows(2)
        .map(|w| crate::graph::geometry::haversine_m(w[0].0, w[0].1, w[1].0, w[1].1))
        .collect();
    let total: f64 = lengths.iter().sum();

    let at = |fraction: f64| -> (usize, (f64, f64)) {
        if total <= 0.0 {
            return (0, points[0]);
        }
        let target = fraction.clamp(0.0, 1.0) * total;
        let mut acc = 0.0;
        for (i, len) in lengths.iter().enumerate() {
            if acc + len >= target || i == lengths.len() - 1 {
                let t = if *len > 0.0 { ((target - acc) / len).clamp(0.0, 1.0) } else { 0.0 };
                let (a, b) = (points[i], points[i + 1]);
                return (i, (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t));
            }
            acc += len;
        }
        (lengths.len() - 1, points[points.len() - 1])
    };

    let (start_seg, start) = at(lo);
    let (end_seg, end) = at(hi);
    let mut out = vec![start];
    for p in points.iter().take(end_seg + 1).skip(start_seg + 1) {
        out.push(*p);
    }
    out.push(end);
    if reversed {
        out.reverse();
    }
    out
}
