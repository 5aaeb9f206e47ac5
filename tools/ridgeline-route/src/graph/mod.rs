//! Graph store - road network nodes, edges and their encoded properties

pub mod builder;
pub mod encoding;
pub mod geometry;
pub mod sort;
pub mod store;
pub mod turn_costs;

pub type NodeId = u32;
pub type EdgeId = u32;

pub use builder::GraphBuilder;
pub use encoding::{EdgeFlags, EncodingManager, VehicleEncoding, VehicleSlot};
pub use geometry::BBox;
pub use store::{EdgeCursor, EdgeView, GraphParts, GraphSignature, RoutingGraph};
pub use turn_costs::{TurnCostTable, TurnKey};
