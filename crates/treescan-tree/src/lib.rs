#![deny(missing_docs)]
#![doc = "Tree model, multi-parent branch propagation and simulation buffers."]

mod data;
mod node;
mod simulation;
mod tree;

pub use data::BranchCounts;
pub use node::{Node, SiteObservation};
pub use simulation::{SimulationBuffer, SimulationNode};
pub use tree::{TreeBuilder, TreeModel};
