//! Reusable mock implementations of the engine's collaborators.

pub mod coordinator;
pub mod proposer;

pub use coordinator::{MockCoordinator, StatusReport};
pub use proposer::{MockProposer, NodeResponse, ProposalCall};
