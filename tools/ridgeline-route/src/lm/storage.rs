//! Quantized landmark distance tables
//!
//! Every node belongs to one subnetwork (0 = too small, no landmarks). Each
//! subnetwork has its own landmark set; column `i` of a node's row refers to
//! landmark `i` of that node's subnetwork. Distances are stored as
//! `floor(d / factor)` in 16 bits.

use crate::graph::NodeId;
use crate::weighting::Weight;

pub const INFINITE: u16 = u16::MAX;
pub const SATURATED: u16 = u16::MAX - 1;
/// Largest regular quantized value
pub const MAX_QUANTIZED: u16 = u16::MAX - 2;

pub const NO_SUBNETWORK: u32 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkStorage {
    pub(crate) profile: String,
    pub(crate) weighting: String,
    pub(crate) factor: f64,
    pub(crate) landmark_count: usize,
    pub(crate) subnetworks: Vec<u32>,
    /// Landmark nodes per subnetwork id; entry 0 is always empty
    pub(crate) landmarks: Vec<Vec<NodeId>>,
    /// Landmark → node, `node * landmark_count + i`
    pub(crate) from: Vec<u16>,
    /// Node → landmark
    pub(crate) to: Vec<u16>,
}

/// Quantize one distance given in fixed-point weight units
pub fn quantize(weight: Weight, factor: f64) -> u16 {
    if weight == crate::weighting::WEIGHT_INFINITY {
        return INFINITE;
    }
    let q = (weight as f64 / factor).floor();
    if q > MAX_QUANTIZED as f64 {
        SATURATED
    } else {
        q as u16
    }
}

impl LandmarkStorage {
    /// Name of the profile the tables were prepared for
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Name of the weighting the distances were computed with
    pub fn weighting_name(&self) -> &str {
        &self.weighting
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn landmark_count(&self) -> usize {
        self.landmark_count
    }

    pub fn node_count(&self) -> usize {
        self.subnetworks.len()
    }

    pub fn subnetwork(&self, node: NodeId) -> u32 {
        self.subnetworks.get(node as usize).copied().unwrap_or(NO_SUBNETWORK)
    }

    /// Number of subnetwork ids, including the unassigned id 0
    pub fn subnetwork_count(&self) -> usize {
        self.landmarks.len()
    }

    pub fn landmarks(&self, subnetwork: u32) -> &[NodeId] {
        self.landmarks
            .get(subnetwork as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn from_landmark(&self, node: NodeId, i: usize) -> u16 {
        self.from[node as usize * self.landmark_count + i]
    }

    pub fn to_landmark(&self, node: NodeId, i: usize) -> u16 {
        self.to[node as usize * self.landmark_count + i]
    }

    /// Lower bound on the weight from `node` to `target` using landmark column `i`.
    ///
    /// Stored values are floored, so each side may be up to one unit low; the
    /// bound subtracts that unit to stay admissible.
    pub fn bound(&self, node: NodeId, target: NodeId, i: usize) -> Weight {
        let mut best = 0i64;
        let (n_from, t_from) = (self.from_landmark(node, i), self.from_landmark(target, i));
        if n_from < SATURATED && t_from < SATURATED {
            best = best.max(t_from as i64 - n_from as i64 - 1);
        }
        let (n_to, t_to) = (self.to_landmark(node, i), self.to_landmark(target, i));
        if n_to < SATURATED && t_to < SATURATED {
            best = best.max(n_to as i64 - t_to as i64 - 1);
        }
        (best as f64 * self.factor).floor() as Weight
    }

    /// Structural checks run after loading from disk
    pub(crate) fn validate(&self) -> Result<(), String> {
        let n = self.subnetworks.len();
        let k = self.landmark_count;
        if !(self.factor.is_finite() && self.factor > 0.0) {
            return Err(format!("invalid quantization factor {}", self.factor));
        }
        if self.from.len() != n * k || self.to.len() != n * k {
            return Err(format!(
                "distance tables hold {} / {} entries, expected {}",
                self.from.len(),
                self.to.len(),
                n * k
            ));
        }
        if self.landmarks.first().is_some_and(|l| !l.is_empty()) {
            return Err("unassigned subnetwork has landmarks".into());
        }
        if let Some(&s) = self.subnetworks.iter().find(|&&s| s as usize >= self.landmarks.len().max(1)) {
            return Err(format!("subnetwork id {s} out of range"));
        }
        for (s, list) in self.landmarks.iter().enumerate() {
            if list.len() > k {
                return Err(format!("subnetwork {s} has {} landmarks, limit {k}", list.len()));
            }
            if list.iter().any(|&l| l as usize >= n) {
                return Err(format!("subnetwork {s} has a landmark outside the graph"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_saturates_and_marks_infinite() {
        assert_eq!(quantize(0, 2.0), 0);
        assert_eq!(quantize(5, 2.0), 2);
        assert_eq!(quantize(1_000_000_000, 2.0), SATURATED);
        assert_eq!(quantize(crate::weighting::WEIGHT_INFINITY, 2.0), INFINITE);
    }

    #[test]
    fn test_bound_uses_both_tables_and_stays_below_truth() {
        // one landmark, three nodes on a line L=0 -> 1 -> 2 with weights 10 each
        let storage = LandmarkStorage {
            profile: "p".into(),
            weighting: "shortest|car".into(),
            factor: 3.0,
            landmark_count: 1,
            subnetworks: vec![1, 1, 1],
            landmarks: vec![vec![], vec![0]],
            from: vec![quantize(0, 3.0), quantize(10, 3.0), quantize(20, 3.0)],
            to: vec![quantize(0, 3.0), quantize(10, 3.0), quantize(20, 3.0)],
        };
        storage.validate().unwrap();
        // true 1 -> 2 is 10: floor(6)-floor(3)-1 = 2 units = 6
        assert_eq!(storage.bound(1, 2, 0), 6);
        assert!(storage.bound(0, 2, 0) <= 20);
        assert_eq!(storage.bound(2, 2, 0), 0);
    }
}
