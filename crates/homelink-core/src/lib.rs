//! # homelink-core
//!
//! Shared library for the HomeLink bridge containing the wire-protocol
//! message types, the line codec, and the SSDP discovery primitives.
//!
//! This crate is used by the bridge binary and by any future native client.
//! It has zero dependencies on sockets, async runtimes, or OS APIs.
//!
//! # Architecture overview
//!
//! The HomeLink bridge exposes a selected set of home-automation devices to
//! a remote hub. The hub finds the bridge via SSDP, opens a TCP connection,
//! and then exchanges newline-delimited JSON messages: the bridge pushes
//! entity state, the hub sends commands.
//!
//! This crate (`homelink-core`) is the shared foundation. It defines:
//!
//! - **`protocol`** – What travels over the network. Every message is one
//!   JSON object per `\n`-terminated UTF-8 line; [`protocol::messages`]
//!   defines the tagged union, [`protocol::codec`] turns lines into typed
//!   messages and back, and [`protocol::ssdp`] parses discovery queries and
//!   builds discovery replies as plain text (no UDP socket in sight).
//!
//! - **`domain`** – Pure data types with no protocol knowledge: the
//!   [`domain::entity::EntitySnapshot`] descriptor forwarded to hubs
//!   verbatim, and the [`domain::identity::BridgeIdentity`] shared by the
//!   TCP and UDP components.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `homelink_core::BridgeMessage` instead of the longer module path.
pub use domain::entity::EntitySnapshot;
pub use domain::identity::BridgeIdentity;
pub use protocol::codec::{encode_line, parse_line, ProtocolError};
pub use protocol::messages::{BridgeMessage, ErrorCode, BRIDGE_PRODUCT, PROTOCOL_VERSION};
