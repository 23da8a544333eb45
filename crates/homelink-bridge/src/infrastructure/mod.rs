//! Infrastructure layer for homelink-bridge.
//!
//! Everything that touches a socket or spawns a task lives here:
//!
//! - [`tcp_server`] — the listener: accept loop, session task tracking,
//!   graceful shutdown.
//! - [`session`] — the per-connection protocol state machine.
//! - [`broadcast`] — the fan-out bus over registered session sinks.
//! - [`discovery`] — the SSDP multicast responder.
//! - [`storage`] — TOML config file persistence.
//!
//! Protocol and message definitions come from `homelink-core`; collaborator
//! behaviour arrives through the `application` trait seams.

pub mod broadcast;
pub mod discovery;
pub mod session;
pub mod storage;
pub mod tcp_server;

// Re-export the primary entry points so `main.rs` can name them concisely.
pub use broadcast::BroadcastBus;
pub use discovery::SsdpResponder;
pub use tcp_server::BridgeServer;
