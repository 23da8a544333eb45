//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup — from the config file, the CLI, or defaults —
//! and then wrapped in an `Arc` so it can be shared cheaply across all
//! session tasks. No global state and no environment reads happen here.

use std::net::SocketAddr;
use std::time::Duration;

use homelink_core::BridgeIdentity;

/// Default TCP port for the bridge protocol.
pub const DEFAULT_PORT: u16 = 8323;

/// All runtime configuration for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The address and port the TCP listener binds to.
    ///
    /// `0.0.0.0` accepts connections from any interface; deployments that
    /// front the bridge with a tunnel can restrict it to `127.0.0.1`.
    pub bind_addr: SocketAddr,

    /// Stable bridge identifier, advertised over SSDP and used by hubs to
    /// key their pairing records. Persisted in the config file.
    pub bridge_id: String,

    /// Human-readable bridge name shown by hubs during setup.
    pub bridge_name: String,

    /// Shared secret for the optional authentication handshake.
    ///
    /// `Some` makes authentication mandatory for every connection; `None`
    /// lets sessions proceed straight from the hello to the entity list.
    /// Whether to require a token is a deployment decision, not a protocol
    /// default.
    pub auth_token: Option<String>,

    /// How long a connecting hub has to present its token before the
    /// session is dropped without a reply.
    pub auth_timeout: Duration,

    /// Pause between the entity list and the initial-state replay, so the
    /// hub can finish its own connection bookkeeping before being flooded.
    pub settle_delay: Duration,

    /// How long `close()` waits for each session to finish its cleanup
    /// before aborting it.
    pub shutdown_grace: Duration,
}

impl BridgeConfig {
    /// The identity shared by the TCP and UDP components.
    pub fn identity(&self) -> BridgeIdentity {
        BridgeIdentity::new(
            self.bridge_id.clone(),
            self.bridge_name.clone(),
            self.bind_addr.port(),
        )
    }

    /// Whether the authentication phase is enabled for this deployment.
    pub fn auth_enabled(&self) -> bool {
        self.auth_token.is_some()
    }
}

impl Default for BridgeConfig {
    /// Returns a `BridgeConfig` suitable for local development: all
    /// interfaces, default port, no authentication.
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address string.
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}").parse().unwrap(),
            bridge_id: String::new(),
            bridge_name: "HomeLink Bridge".to_string(),
            auth_token: None,
            auth_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(800),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
