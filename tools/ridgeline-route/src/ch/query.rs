//! Bidirectional query on the hierarchy
//!
//! The forward search only follows arcs to higher-ranked states, the backward
//! search only arcs coming from higher-ranked states. Both start from all
//! seeds of their endpoint. A side stops once its smallest key reaches the
//! best meeting cost; stall-on-demand skips states that a higher-ranked,
//! already reached state proves to be suboptimal.

use std::cmp::Reverse;

use priority_queue::PriorityQueue;
use ridgeline_common::{Result, RouteError};
use rustc_hash::FxHashMap;
use tracing::trace;

use super::graph::ChGraph;
use crate::search::{SearchOutcome, SearchPath, Seed, StateId};
use crate::weighting::{Weight, WEIGHT_INFINITY};

const NO_ARC: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Entry {
    weight: Weight,
    /// Arc used to reach the state, `NO_ARC` for seeds
    arc: u32,
    seed: u32,
}

#[derive(Default)]
struct Side {
    entries: FxHashMap<StateId, Entry>,
    queue: PriorityQueue<StateId, Reverse<Weight>>,
    done: bool,
}

impl Side {
    fn seed(&mut self, seeds: &[Seed]) {
        for (i, s) in seeds.iter().enumerate() {
            if s.weight == WEIGHT_INFINITY {
                continue;
            }
            let better = self.entries.get(&s.state).map_or(true, |e| s.weight < e.weight);
            if better {
                self.entries.insert(
                    s.state,
                    Entry {
                        weight: s.weight,
                        arc: NO_ARC,
                        seed: i as u32,
                    },
                );
                self.queue.push_increase(s.state, Reverse(s.weight));
            }
        }
        self.done = self.queue.is_empty();
    }

    fn min_key(&self) -> Weight {
        self.queue.peek().map_or(WEIGHT_INFINITY, |(_, Reverse(w))| *w)
    }

    fn weight(&self, state: StateId) -> Weight {
        self.entries.get(&state).map_or(WEIGHT_INFINITY, |e| e.weight)
    }
}

pub struct ChQuery<'a> {
    ch: &'a ChGraph,
    max_visited: usize,
}

impl<'a> ChQuery<'a> {
    pub fn new(ch: &'a ChGraph) -> Self {
        Self {
            ch,
            max_visited: usize::MAX,
        }
    }

    pub fn with_max_visited(mut self, max_visited: usize) -> Self {
        self.max_visited = max_visited;
        self
    }

    fn check_seeds(&self, seeds: &[Seed]) -> Result<()> {
        match seeds.iter().find(|s| self.ch.rank(s.state).is_none()) {
            Some(s) => Err(RouteError::InternalConsistency {
                profile: self.ch.profile().to_string(),
                detail: format!(
                    "state {} has no rank in a hierarchy of {} states",
                    s.state,
                    self.ch.state_count()
                ),
            }),
            None => Ok(()),
        }
    }

    pub fn route(&self, sources: &[Seed], targets: &[Seed]) -> Result<SearchOutcome> {
        self.check_seeds(sources)?;
        self.check_seeds(targets)?;

        let mut fwd = Side::default();
        let mut bwd = Side::default();
        fwd.seed(sources);
        bwd.seed(targets);

        let mut best = WEIGHT_INFINITY;
        let mut meet = None;
        let mut visited = 0usize;

        loop {
            if !fwd.done && fwd.min_key() >= best {
                fwd.done = true;
            }
            if !bwd.done && bwd.min_key() >= best {
                bwd.done = true;
            }
            let forward = match (fwd.done, bwd.done) {
                (true, true) => break,
                (false, true) => true,
                (true, false) => false,
                (false, false) => fwd.min_key() <= bwd.min_key(),
            };
            let (this, other) = if forward { (&mut fwd, &bwd) } else { (&mut bwd, &fwd) };

            let Some((v, Reverse(d))) = this.queue.pop() else {
                this.done = true;
                continue;
            };
            visited += 1;
            if visited > self.max_visited {
                trace!(visited, "visited budget exhausted");
                return Ok(SearchOutcome::LimitExceeded { visited });
            }
            if this.queue.is_empty() {
                this.done = true;
            }

            let across = other.weight(v);
            if across != WEIGHT_INFINITY {
                let total = d.saturating_add(across);
                if total < best {
                    best = total;
                    meet = Some(v);
                }
            }

            if self.stalled(v, d, forward, this) {
                continue;
            }
            self.relax(v, d, forward, this);
        }

        let Some(meet) = meet else {
            return Ok(SearchOutcome::NoPath { visited });
        };

        let (mut labels, source) = self.unwind(&fwd, meet, true);
        labels.reverse();
        let (tail, target) = self.unwind(&bwd, meet, false);
        labels.extend(tail);

        Ok(SearchOutcome::Found(SearchPath {
            weight: best,
            source,
            target,
            labels,
            visited,
        }))
    }

    /// A higher-ranked state reaching `v` more cheaply than `d` makes expanding `v` pointless
    fn stalled(&self, v: StateId, d: Weight, forward: bool, side: &Side) -> bool {
        let check = |arc_id: u32, neighbor: StateId| {
            let arc = self.ch.arc(arc_id);
            side.weight(neighbor).saturating_add(arc.weight) < d
        };
        if forward {
            self.ch.down(v).any(|a| check(a, self.ch.arc(a).from))
        } else {
            self.ch.up(v).any(|a| check(a, self.ch.arc(a).to))
        }
    }

    fn relax(&self, v: StateId, d: Weight, forward: bool, side: &mut Side) {
        let arcs: Box<dyn Iterator<Item = u32>> = if forward {
            Box::new(self.ch.up(v))
        } else {
            Box::new(self.ch.down(v))
        };
        let seed = side.entries.get(&v).map_or(0, |e| e.seed);
        for id in arcs {
            let arc = self.ch.arc(id);
            let next = if forward { arc.to } else { arc.from };
            let weight = d.saturating_add(arc.weight);
            if weight < side.weight(next) {
                side.entries.insert(next, Entry { weight, arc: id, seed });
                side.queue.push_increase(next, Reverse(weight));
                side.done = false;
            }
        }
    }

    /// Labels from `meet` back to the seed of one side, and that seed's index.
    /// Forward labels come out in reverse travel order.
    fn unwind(&self, side: &Side, meet: StateId, forward: bool) -> (Vec<u32>, usize) {
        let mut labels = Vec::new();
        let mut state = meet;
        while let Some(entry) = side.entries.get(&state) {
            if entry.arc == NO_ARC {
                return (labels, entry.seed as usize);
            }
            let arc = self.ch.arc(entry.arc);
            let mut piece = Vec::new();
            self.ch.unpack(entry.arc, &mut piece);
            if forward {
                labels.extend(piece.into_iter().rev());
                state = arc.from;
            } else {
                labels.extend(piece);
                state = arc.to;
            }
        }
        (labels, 0)
    }
}
