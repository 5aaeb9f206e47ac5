//! Unidirectional A* over a state graph
//!
//! With [`ZeroApproximator`](super::ZeroApproximator) this is Dijkstra. States
//! may be settled more than once when the approximator is admissible but not
//! consistent; the search stops once the smallest key reaches the best path
//! found so far.

use std::cmp::Reverse;

use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap;
use tracing::trace;

use super::{Approximator, SearchPath, Seed, StateGraph, StateId};
use crate::weighting::{Weight, WEIGHT_INFINITY};

const NO_PARENT: StateId = StateId::MAX;

/// How a point-to-point search ended
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(SearchPath),
    NoPath { visited: usize },
    LimitExceeded { visited: usize },
}

impl SearchOutcome {
    pub fn visited(&self) -> usize {
        match self {
            SearchOutcome::Found(p) => p.visited,
            SearchOutcome::NoPath { visited } | SearchOutcome::LimitExceeded { visited } => *visited,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Label {
    weight: Weight,
    estimate: Weight,
    parent: StateId,
    via: u32,
    source: u32,
}

pub struct AStar<'a, G: StateGraph, A: Approximator> {
    graph: &'a G,
    approximator: &'a A,
    max_visited: usize,
}

impl<'a, G: StateGraph, A: Approximator> AStar<'a, G, A> {
    pub fn new(graph: &'a G, approximator: &'a A) -> Self {
        Self {
            graph,
            approximator,
            max_visited: usize::MAX,
        }
    }

    pub fn with_max_visited(mut self, max_visited: usize) -> Self {
        self.max_visited = max_visited;
        self
    }

    pub fn route(&self, sources: &[Seed], targets: &[Seed]) -> SearchOutcome {
        let mut exits: FxHashMap<StateId, usize> = FxHashMap::default();
        for (i, t) in targets.iter().enumerate() {
            if t.weight == WEIGHT_INFINITY {
                continue;
            }
            let slot = exits.entry(t.state).or_insert(i);
            if targets[*slot].weight > t.weight {
                *slot = i;
            }
        }

        let mut labels: FxHashMap<StateId, Label> = FxHashMap::default();
        let mut queue: PriorityQueue<StateId, Reverse<Weight>> = PriorityQueue::new();

        for (i, s) in sources.iter().enumerate() {
            if s.weight == WEIGHT_INFINITY {
                continue;
            }
            let better = labels.get(&s.state).map_or(true, |l| s.weight < l.weight);
            if better {
                let estimate = self.approximator.approximate(self.graph.node_of(s.state));
                labels.insert(
                    s.state,
                    Label {
                        weight: s.weight,
                        estimate,
                        parent: NO_PARENT,
                        via: 0,
                        source: i as u32,
                    },
                );
                queue.push(s.state, Reverse(s.weight.saturating_add(estimate)));
            }
        }

        let mut best = WEIGHT_INFINITY;
        let mut best_state = NO_PARENT;
        let mut visited = 0usize;

        while let Some((state, Reverse(key))) = queue.pop() {
            if key >= best || key == WEIGHT_INFINITY {
                break;
            }
            visited += 1;
            if visited > self.max_visited {
                trace!(visited, "visited budget exhausted");
                return SearchOutcome::LimitExceeded { visited };
            }
            let Some(&current) = labels.get(&state) else {
                continue;
            };

            if let Some(&t) = exits.get(&state) {
                let total = current.weight.saturating_add(targets[t].weight);
                if total < best {
                    best = total;
                    best_state = state;
                }
            }

            self.graph.for_each_arc(state, &mut |next, w, via| {
                let weight = current.weight.saturating_add(w);
                if weight == WEIGHT_INFINITY {
                    return;
                }
                let estimate = match labels.get(&next) {
                    Some(l) if l.weight <= weight => return,
                    Some(l) => l.estimate,
                    None => self.approximator.approximate(self.graph.node_of(next)),
                };
                labels.insert(
                    next,
                    Label {
                        weight,
                        estimate,
                        parent: state,
                        via,
                        source: current.source,
                    },
                );
                queue.push_increase(next, Reverse(weight.saturating_add(estimate)));
            });
        }

        if best_state == NO_PARENT {
            return SearchOutcome::NoPath { visited };
        }

        let mut path_labels = Vec::new();
        let mut state = best_state;
        let mut source = 0;
        while let Some(l) = labels.get(&state) {
            if l.parent == NO_PARENT {
                source = l.source as usize;
                break;
            }
            path_labels.push(l.via);
            state = l.parent;
        }
        path_labels.reverse();

        SearchOutcome::Found(SearchPath {
            weight: best,
            source,
            target: exits.get(&best_state).copied().unwrap_or(0),
            labels: path_labels,
            visited,
        })
    }
}
