//! Line codec: typed messages ⇄ newline-delimited JSON.
//!
//! # Why decoding is two-staged
//!
//! The protocol distinguishes two failure classes that a plain
//! `serde_json::from_str::<BridgeMessage>` would conflate:
//!
//! - **`bad_json`** — the line is not valid JSON at all.
//! - **`bad_command`** — the line is valid JSON with `"type":"command"`, but
//!   `entity_id`/`command` are missing or not strings, or `args` is present
//!   and not an object.
//!
//! So [`parse_line`] first parses the line into a generic
//! [`serde_json::Value`] (failure = [`ProtocolError::Json`]), then reads the
//! `"type"` discriminator. `command` lines get explicit shape validation;
//! every other known discriminator goes through the derived deserializer,
//! and anything unrecognisable becomes [`BridgeMessage::Unknown`] so the
//! session can ignore it.
//!
//! Encoding is infallible in practice but still returns a `Result`: a
//! malformed outgoing payload must fail here, at construction time, rather
//! than disappear inside a best-effort send.

use serde_json::Value;
use thiserror::Error;

use super::messages::BridgeMessage;

/// Error type for line encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was not valid JSON.
    #[error("invalid JSON line: {0}")]
    Json(#[from] serde_json::Error),

    /// A `command` message failed shape validation.
    #[error("malformed command: {0}")]
    BadCommand(&'static str),
}

/// Serializes `msg` to one `\n`-terminated line.
///
/// # Errors
///
/// Returns [`ProtocolError::Json`] if serialization fails (only possible for
/// payloads containing non-string map keys or similar constructions that the
/// bridge never builds).
pub fn encode_line(msg: &BridgeMessage) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Parses one line (without or with its trailing newline) into a message.
///
/// # Errors
///
/// - [`ProtocolError::Json`] when the line is not valid JSON.
/// - [`ProtocolError::BadCommand`] when a `command` line has the wrong shape.
///
/// Lines that are valid JSON but carry no usable `"type"` — a bare number,
/// an object without a discriminator, an unknown discriminator, or a known
/// discriminator with fields this bridge cannot interpret — all decode to
/// [`BridgeMessage::Unknown`], which sessions ignore.
pub fn parse_line(line: &str) -> Result<BridgeMessage, ProtocolError> {
    let value: Value = serde_json::from_str(line.trim())?;

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Ok(BridgeMessage::Unknown);
    };

    if kind == "command" {
        return parse_command(&value);
    }

    // All remaining known discriminators go through the derived
    // deserializer; shape mismatches on non-command messages are treated as
    // unrecognised rather than fatal (a hub sending us a garbled `auth` is
    // handled by the session state machine, not the codec).
    Ok(serde_json::from_value(value).unwrap_or(BridgeMessage::Unknown))
}

/// Validates and extracts a `command` message.
///
/// `entity_id` and `command` must be strings; `args` defaults to an empty
/// map when absent and must be an object when present.
fn parse_command(value: &Value) -> Result<BridgeMessage, ProtocolError> {
    let entity_id = value
        .get("entity_id")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::BadCommand("entity_id must be a string"))?;
    let command = value
        .get("command")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::BadCommand("command must be a string"))?;
    let args = match value.get("args") {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(ProtocolError::BadCommand("args must be an object")),
    };

    Ok(BridgeMessage::Command {
        entity_id: entity_id.to_string(),
        command: command.to_string(),
        args,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
