//! ridgeline-route: road routing on a frozen graph
//!
//! The graph store is built once and frozen. Contraction hierarchies and
//! landmark tables are prepared per profile, persisted, and loaded again on
//! the next start. The [`router::Router`] resolves request points through the
//! location index and runs the fastest search a request allows.

pub mod ch;
pub mod cli;
pub mod config;
pub mod engine;
pub mod formats;
pub mod graph;
pub mod index;
pub mod lm;
pub mod router;
pub mod search;
pub mod weighting;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use engine::Engine;
pub use graph::{GraphBuilder, RoutingGraph};
pub use router::{Algorithm, RequestHints, RouteRequest, RouteResponse, Router};
