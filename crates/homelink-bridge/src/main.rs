//! HomeLink bridge — entry point.
//!
//! This binary exposes a configured set of home-automation entities to a
//! remote hub: a newline-delimited JSON protocol over TCP for live state and
//! commands, plus a passive SSDP responder so hubs can find the bridge
//! without manual addressing.
//!
//! # Usage
//!
//! ```text
//! homelink-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>   TOML config file (entities, identity, token)
//!   --port   <PORT>   TCP listener port [default: 8323]
//!   --bind   <ADDR>   Bind address [default: 0.0.0.0]
//!   --name   <NAME>   Bridge display name
//!   --token  <TOKEN>  Shared secret; presence makes auth mandatory
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable          | Description                          |
//! |-------------------|--------------------------------------|
//! | `HOMELINK_CONFIG` | Config file path                     |
//! | `HOMELINK_PORT`   | TCP listener port                    |
//! | `HOMELINK_BIND`   | Bind address                         |
//! | `HOMELINK_NAME`   | Bridge display name                  |
//! | `HOMELINK_TOKEN`  | Shared secret                        |
//!
//! CLI args take precedence over the config file; the config file over the
//! built-in defaults.
//!
//! # Architecture overview
//!
//! ```text
//! main()
//!  └─ load config (storage::load_or_init)
//!  └─ EntityRegistry::new            -- standalone collaborators
//!  └─ BridgeServer::start            -- TCP accept loop
//!  └─ SsdpResponder::start           -- UDP discovery (best-effort)
//!  └─ state pump: registry events → broadcast bus
//!  └─ ctrl-c → close() + stop()
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use homelink_bridge::application::{
    CommandExecutor, EntityRegistry, EntitySnapshotProvider, InitialStateProvider,
};
use homelink_bridge::domain::BridgeConfig;
use homelink_bridge::infrastructure::storage;
use homelink_bridge::infrastructure::{BridgeServer, SsdpResponder};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// HomeLink network bridge.
///
/// Serves the entities declared in the config file over the HomeLink TCP
/// protocol and answers SSDP discovery queries.
#[derive(Debug, Parser)]
#[command(
    name = "homelink-bridge",
    about = "Home-automation network bridge: JSON-lines TCP server + SSDP discovery",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// Created on first run when it does not exist; the generated bridge id
    /// is persisted there so hubs recognise the bridge across restarts.
    #[arg(long, env = "HOMELINK_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the bridge protocol. Overrides the config file.
    #[arg(long, env = "HOMELINK_PORT")]
    port: Option<u16>,

    /// IP address to bind the TCP listener to. Overrides the config file.
    #[arg(long, env = "HOMELINK_BIND")]
    bind: Option<String>,

    /// Bridge display name shown by hubs. Overrides the config file.
    #[arg(long, env = "HOMELINK_NAME")]
    name: Option<String>,

    /// Shared secret. When set (here or in the config file), every
    /// connection must authenticate before anything else.
    #[arg(long, env = "HOMELINK_TOKEN")]
    token: Option<String>,
}

impl Cli {
    /// Loads the config file (when given) and applies CLI overrides on top.
    fn into_file_config(self) -> anyhow::Result<storage::FileConfig> {
        let mut file = match &self.config {
            Some(path) => storage::load_or_init(path)
                .with_context(|| format!("cannot load config from {}", path.display()))?,
            None => {
                // Without a file there is nowhere to persist the id; hubs
                // will see a new bridge after every restart.
                warn!("no --config given; bridge id will not survive restarts");
                let mut file = storage::FileConfig::default();
                file.bridge.id = Some(uuid::Uuid::new_v4().to_string());
                file
            }
        };

        if let Some(port) = self.port {
            file.bridge.port = port;
        }
        if let Some(bind) = self.bind {
            file.bridge.bind = bind;
        }
        if let Some(name) = self.name {
            file.bridge.name = name;
        }
        if let Some(token) = self.token {
            file.bridge.token = Some(token);
        }
        Ok(file)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging; level overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = cli.into_file_config()?;
    let definitions = file.entity_definitions();
    let config: BridgeConfig = file.to_bridge_config()?;
    let identity = config.identity();

    info!(
        "HomeLink bridge starting — {} on {} ({} entities, auth {})",
        identity.name,
        config.bind_addr,
        definitions.len(),
        if config.auth_enabled() { "on" } else { "off" },
    );

    // Standalone collaborators: the registry implements all three seams and
    // reports its state changes on a channel.
    let (registry, mut state_events) = EntityRegistry::new(definitions);

    let entities: Arc<dyn EntitySnapshotProvider> = registry.clone();
    let commands: Arc<dyn CommandExecutor> = registry.clone();
    let initial_state: Arc<dyn InitialStateProvider> = registry.clone();
    let server = Arc::new(BridgeServer::new(
        config,
        entities,
        commands,
        Some(initial_state),
    ));

    // Listener bind failure is the one fatal startup error.
    let addr = server.start().await.context("cannot start bridge server")?;

    // Discovery is best-effort: a failure leaves the bridge reachable by
    // direct addressing, so log and continue.
    let responder = SsdpResponder::new(identity);
    if let Err(e) = responder.start().await {
        error!("ssdp responder failed to start: {e}");
    }

    // State pump: every state change the registry reports is fanned out to
    // all connected hubs.
    let broadcaster = Arc::clone(&server);
    tokio::spawn(async move {
        while let Some(event) = state_events.recv().await {
            match broadcaster.broadcast(&event) {
                Ok(delivered) => debug!("state event delivered to {delivered} session(s)"),
                Err(e) => error!("undeliverable state event: {e}"),
            }
        }
    });

    info!("HomeLink bridge ready on {addr} — press Ctrl-C to exit");
    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;

    info!("shutdown signal received");
    responder.stop().await;
    server.close().await;
    info!("HomeLink bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_leave_overrides_unset() {
        let cli = Cli::parse_from(["homelink-bridge"]);
        assert!(cli.config.is_none());
        assert!(cli.port.is_none());
        assert!(cli.bind.is_none());
        assert!(cli.name.is_none());
        assert!(cli.token.is_none());
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["homelink-bridge", "--port", "9999"]);
        assert_eq!(cli.port, Some(9999));
    }

    #[test]
    fn test_cli_token_override() {
        let cli = Cli::parse_from(["homelink-bridge", "--token", "s3cret"]);
        assert_eq!(cli.token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_into_file_config_applies_overrides() {
        let cli = Cli::parse_from([
            "homelink-bridge",
            "--port",
            "9001",
            "--bind",
            "127.0.0.1",
            "--name",
            "Attic Bridge",
            "--token",
            "t0ken",
        ]);
        let file = cli.into_file_config().unwrap();
        assert_eq!(file.bridge.port, 9001);
        assert_eq!(file.bridge.bind, "127.0.0.1");
        assert_eq!(file.bridge.name, "Attic Bridge");
        assert_eq!(file.bridge.token.as_deref(), Some("t0ken"));
    }

    #[test]
    fn test_into_file_config_without_file_generates_id() {
        let cli = Cli::parse_from(["homelink-bridge"]);
        let file = cli.into_file_config().unwrap();
        assert!(file.bridge.id.is_some());
    }

    #[test]
    fn test_into_file_config_produces_valid_bridge_config() {
        let cli = Cli::parse_from(["homelink-bridge", "--port", "9001"]);
        let config = cli.into_file_config().unwrap().to_bridge_config().unwrap();
        assert_eq!(config.bind_addr.port(), 9001);
        assert!(!config.auth_enabled());
    }
}
