//! ALT lower bounds from landmark tables

use super::storage::{LandmarkStorage, NO_SUBNETWORK};
use crate::graph::NodeId;
use crate::search::Approximator;
use crate::weighting::Weight;

/// Triangle-inequality bound over the landmarks that look most useful for
/// one query. The active set is picked once, from the bounds at the source.
pub struct LandmarkApproximator<'a> {
    storage: &'a LandmarkStorage,
    subnetwork: u32,
    active: Vec<usize>,
    /// (node, exit weight) pairs
    targets: Vec<(NodeId, Weight)>,
}

impl<'a> LandmarkApproximator<'a> {
    pub fn new(
        storage: &'a LandmarkStorage,
        source: NodeId,
        targets: &[(NodeId, Weight)],
        active_count: usize,
    ) -> Self {
        let subnetwork = targets
            .iter()
            .map(|&(t, _)| storage.subnetwork(t))
            .find(|&s| s != NO_SUBNETWORK)
            .unwrap_or(NO_SUBNETWORK);
        let available = storage.landmarks(subnetwork).len();

        let mut scored: Vec<(Weight, usize)> = (0..available)
            .map(|i| {
                let best = targets
                    .iter()
                    .filter(|&&(t, _)| storage.subnetwork(t) == subnetwork)
                    .map(|&(t, _)| storage.bound(source, t, i))
                    .max()
                    .unwrap_or(0);
                (best, i)
            })
            .collect();
        if storage.subnetwork(source) != subnetwork {
            scored.clear();
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let active = scored.into_iter().take(active_count).map(|(_, i)| i).collect();

        Self {
            storage,
            subnetwork,
            active,
            targets: targets.to_vec(),
        }
    }

    pub fn active_landmarks(&self) -> &[usize] {
        &self.active
    }
}

impl Approximator for LandmarkApproximator<'_> {
    fn approximate(&self, node: NodeId) -> Weight {
        let in_subnetwork = self.subnetwork != NO_SUBNETWORK && self.storage.subnetwork(node) == self.subnetwork;
        self.targets
            .iter()
            .map(|&(t, exit)| {
                let bound = if in_subnetwork && self.storage.subnetwork(t) == self.subnetwork {
                    self.active
                        .iter()
                        .map(|&i| self.storage.bound(node, t, i))
                        .max()
                        .unwrap_or(0)
                } else {
                    0
                };
                bound.saturating_add(exit)
            })
            .min()
            .unwrap_or(0)
    }
}
