//! Application layer for homelink-bridge.
//!
//! Defines the three collaborator interfaces the protocol core consumes —
//! entity snapshots, command execution, and initial-state replay — and one
//! in-memory implementation of all three for standalone deployments.
//!
//! The infrastructure layer depends only on the traits; which implementation
//! sits behind them is decided by whoever wires the bridge together.

pub mod collaborators;
pub mod registry;

pub use collaborators::{
    CommandError, CommandExecutor, EntitySnapshotProvider, InitialStateProvider,
};
pub use registry::EntityRegistry;
