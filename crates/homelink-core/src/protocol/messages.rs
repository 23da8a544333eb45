//! All HomeLink stream-protocol message types.
//!
//! Every message travels as exactly one JSON object on one `\n`-terminated
//! UTF-8 line. A `"type"` field identifies the variant; all other fields are
//! flattened into the same object:
//!
//! ```json
//! {"type":"hello","bridge":"homelink","version":"1.1","token_required":true}
//! {"type":"command","entity_id":"light.kitchen","command":"toggle","args":{}}
//! {"type":"error","code":"bad_json"}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles the discriminator
//! automatically. Unknown `"type"` values map to [`BridgeMessage::Unknown`]
//! rather than a decode error — hubs newer than this bridge may send message
//! kinds we have never heard of, and the protocol treats those as no-ops.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::entity::EntitySnapshot;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Protocol version string carried in `hello`.
pub const PROTOCOL_VERSION: &str = "1.1";

/// Product identifier carried in the `bridge` field of `hello`.
pub const BRIDGE_PRODUCT: &str = "homelink";

// ── Error codes ───────────────────────────────────────────────────────────────

/// Reason codes carried by `error` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A line was not a valid JSON object.
    BadJson,
    /// A `command` message failed shape validation.
    BadCommand,
    /// Authentication failed (wrong token, or no token presented).
    Unauthorized,
}

// ── Message union ─────────────────────────────────────────────────────────────

/// All messages that can appear on the HomeLink TCP stream, both directions.
///
/// The bridge sends `hello`, `auth_ok`, `entity_list`, `state`, `pong`, and
/// `error`; hubs send `auth`, `command`, and `ping`. A single enum covers
/// both directions because the replay path forwards pre-formatted `state`
/// messages supplied by the initial-state provider, and the test suite acts
/// as both peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// First message on every connection, bridge → hub.
    Hello {
        /// Product identifier; always [`BRIDGE_PRODUCT`].
        bridge: String,
        /// Protocol version; always [`PROTOCOL_VERSION`].
        version: String,
        /// `Some(true)` when the deployment requires a shared-secret
        /// handshake before anything else; omitted entirely when
        /// authentication is disabled.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_required: Option<bool>,
    },

    /// Shared-secret handshake, hub → bridge.
    Auth { token: String },

    /// Token accepted, bridge → hub.
    AuthOk,

    /// The exposed-device list, bridge → hub. Sent once after the handshake
    /// and re-broadcast whenever the exposed set changes.
    EntityList { entities: Vec<EntitySnapshot> },

    /// A device state change, bridge → hub.
    State {
        entity_id: String,
        /// The platform state string, e.g. `"on"`.
        state: String,
        /// State attributes, forwarded verbatim.
        attributes: Map<String, Value>,
        /// Unix seconds at the time of the change.
        ts: u64,
    },

    /// A device command, hub → bridge.
    Command {
        entity_id: String,
        command: String,
        /// Command arguments; an absent field means "no arguments".
        #[serde(default)]
        args: Map<String, Value>,
    },

    /// Liveness probe, hub → bridge.
    Ping,

    /// Liveness reply, bridge → hub.
    Pong,

    /// Protocol-level failure report, bridge → hub.
    Error { code: ErrorCode },

    /// Any message whose `"type"` this bridge does not recognise.
    ///
    /// Never constructed for sending; inbound lines with a foreign
    /// discriminator land here and are silently ignored by the session.
    #[serde(other)]
    Unknown,
}

impl BridgeMessage {
    /// The `hello` message this bridge version sends on connect.
    pub fn hello(token_required: bool) -> Self {
        BridgeMessage::Hello {
            bridge: BRIDGE_PRODUCT.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            token_required: token_required.then_some(true),
        }
    }

    /// Shorthand for an `error` message with the given code.
    pub fn error(code: ErrorCode) -> Self {
        BridgeMessage::Error { code }
    }

    /// Short variant name used in log messages, so field values (tokens in
    /// particular) never end up in the log output.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::Hello { .. } => "hello",
            BridgeMessage::Auth { .. } => "auth",
            BridgeMessage::AuthOk => "auth_ok",
            BridgeMessage::EntityList { .. } => "entity_list",
            BridgeMessage::State { .. } => "state",
            BridgeMessage::Command { .. } => "command",
            BridgeMessage::Ping => "ping",
            BridgeMessage::Pong => "pong",
            BridgeMessage::Error { .. } => "error",
            BridgeMessage::Unknown => "unknown",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
