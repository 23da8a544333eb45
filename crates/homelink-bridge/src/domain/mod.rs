//! Domain layer for homelink-bridge.
//!
//! Contains pure business-logic types with no dependencies on I/O,
//! networking, or external frameworks. Configuration lives here as a plain
//! struct; the infrastructure layer is responsible for populating it from
//! the CLI and the config file.

pub mod config;

pub use config::BridgeConfig;
