//! Collaborator interfaces consumed by the protocol core.
//!
//! The bridge itself never talks to a home-automation platform. Everything
//! platform-specific arrives through these three seams, injected at
//! construction time — which also makes the session machinery fully testable
//! with recording doubles.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use homelink_core::{BridgeMessage, EntitySnapshot};

/// Error type reported by command executors.
///
/// Execution failures are the executor's concern: the session logs them at
/// debug and never reports them back to the hub or tears anything down.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("unsupported command '{command}' for {entity_id}")]
    Unsupported { entity_id: String, command: String },
    #[error("command failed: {0}")]
    Failed(String),
}

/// Supplies the current exposable-device list.
///
/// Called once per session at handshake time; the returned snapshot is what
/// that session's `entity_list` reflects. Must not block.
pub trait EntitySnapshotProvider: Send + Sync {
    fn entities(&self) -> Vec<EntitySnapshot>;
}

/// Performs a device command asynchronously.
///
/// The session fires this and moves on to the next line without awaiting
/// completion; the result is only ever logged.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        entity_id: &str,
        command: &str,
        args: Map<String, Value>,
    ) -> Result<(), CommandError>;
}

/// Supplies pre-formatted `state` messages to replay to a fresh client.
///
/// The messages are forwarded in order, verbatim; the bridge does not
/// inspect them. Must not block.
pub trait InitialStateProvider: Send + Sync {
    fn initial_states(&self) -> Vec<BridgeMessage>;
}
