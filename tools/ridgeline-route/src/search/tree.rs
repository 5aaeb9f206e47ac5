//! One-to-all shortest path trees

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::{StateGraph, StateId};
use crate::weighting::{Weight, WEIGHT_INFINITY};

/// Distance from the nearest of `sources` to every state, `WEIGHT_INFINITY`
/// where unreachable. States rejected by `allow` are never entered.
pub fn shortest_path_tree<G, F>(graph: &G, sources: &[StateId], allow: F) -> Vec<Weight>
where
    G: StateGraph + ?Sized,
    F: Fn(StateId) -> bool,
{
    let mut dist = vec![WEIGHT_INFINITY; graph.state_count()];
    let mut heap = BinaryHeap::new();
    for &s in sources {
        if allow(s) {
            dist[s as usize] = 0;
            heap.push(Reverse((0, s)));
        }
    }
    while let Some(Reverse((d, u))) = heap.pop() {
        if d > dist[u as usize] {
            continue;
        }
        graph.for_each_arc(u, &mut |v, w, _| {
            if !allow(v) {
                return;
            }
            let nd = d.saturating_add(w);
            if nd < dist[v as usize] {
                dist[v as usize] = nd;
                heap.push(Reverse((nd, v)));
            }
        });
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightingKind;
    use crate::search::NodeBasedGraph;
    use crate::testing::{profile, ring, weighting};

    #[test]
    fn test_tree_on_ring_with_filter() {
        let g = ring(6);
        let w = weighting(&g, &profile(WeightingKind::Shortest, false));
        let nb = NodeBasedGraph::new(&g, w.as_ref());

        let all = shortest_path_tree(&nb, &[0], |_| true);
        assert_eq!(all, vec![0, 1_000, 2_000, 3_000, 2_000, 1_000]);

        // blocking node 1 forces the long way round
        let blocked = shortest_path_tree(&nb, &[0], |n| n != 1);
        assert_eq!(blocked[2], 4_000);
        assert_eq!(blocked[1], WEIGHT_INFINITY);
    }
}
