//! homelink-bridge library crate.
//!
//! This crate exposes a selected set of home-automation entities to a remote
//! hub over two surfaces: a newline-delimited JSON TCP protocol for live
//! state push and command intake, and a passive SSDP responder so hubs can
//! find the bridge without prior configuration.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Hub (JSON lines over TCP, SSDP over UDP)
//!         ↕
//! [homelink-bridge]
//!   ├── domain/           Pure types: BridgeConfig
//!   ├── application/      Collaborator interfaces + standalone registry
//!   └── infrastructure/
//!         ├── tcp_server/  Accept loop and session lifecycle
//!         ├── session/     Per-connection protocol state machine
//!         ├── broadcast/   Fan-out bus over registered session sinks
//!         ├── discovery/   SSDP multicast responder
//!         └── storage/     TOML config file persistence
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no frameworks).
//! - `application` depends on `domain` and `homelink-core` only; it defines
//!   the trait seams the protocol core consumes (entity snapshots, command
//!   execution, initial-state replay) and one in-memory implementation for
//!   standalone deployments.
//! - `infrastructure` depends on all other layers plus `tokio` and owns
//!   every socket and spawned task.

/// Domain layer: pure configuration types (no I/O).
pub mod domain;

/// Application layer: collaborator interfaces and the standalone registry.
pub mod application;

/// Infrastructure layer: TCP server, sessions, broadcast bus, SSDP, storage.
pub mod infrastructure;
