//! The HomeLink wire protocol.
//!
//! Two independent surfaces share this module:
//!
//! - The **TCP stream protocol**: newline-delimited JSON, one message per
//!   line. [`messages`] defines the tagged union, [`codec`] converts between
//!   lines and typed messages.
//! - The **UDP discovery protocol**: SSDP M-SEARCH queries and unicast
//!   replies, handled as plain text by [`ssdp`].
//!
//! Everything here is pure — sockets and tasks live in the bridge crate.

pub mod codec;
pub mod messages;
pub mod ssdp;
