//! Persistence for homelink-bridge.
//!
//! The only thing the bridge keeps on disk is its configuration file; all
//! protocol state is in-memory and rebuilt on reconnect.

pub mod config;

pub use config::{load_or_init, ConfigError, FileConfig};
