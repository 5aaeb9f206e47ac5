//! Locality sort - renumber nodes in depth-first visiting order
//!
//! Nodes that are close in the graph end up close in memory, which keeps the
//! per-node columns of CH and landmark tables cache friendly.

use super::NodeId;

/// Depth-first order over an undirected adjacency.
///
/// Returns `map` with `map[old] = new`. Components are visited in order of
/// their smallest node id, so the result is deterministic.
pub fn dfs_order<F, I>(node_count: usize, mut neighbors: F) -> Vec<NodeId>
where
    F: FnMut(NodeId) -> I,
    I: IntoIterator<Item = NodeId>,
{
    const UNSET: NodeId = NodeId::MAX;
    let mut map = vec![UNSET; node_count];
    let mut next: NodeId = 0;
    let mut stack: Vec<NodeId> = Vec::new();

    for root in 0..node_count as NodeId {
        if map[root as usize] != UNSET {
            continue;
        }
        stack.push(root);
        while let Some(node) = stack.pop() {
            if map[node as usize] != UNSET {
                continue;
            }
            map[node as usize] = next;
            next += 1;
            for nb in neighbors(node) {
                if map[nb as usize] == UNSET {
                    stack.push(nb);
                }
            }
        }
    }

    map
}
