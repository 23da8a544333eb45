//! Bridge server: accept loop and session lifecycle management.
//!
//! This module is responsible for:
//!
//! 1. Binding the TCP listener on the configured address.
//! 2. Accepting incoming hub connections and spawning one session task per
//!    connection (see [`super::session`]).
//! 3. Owning the [`BroadcastBus`] and exposing `broadcast` pass-throughs to
//!    the application.
//! 4. Graceful shutdown: `close()` signals every session, waits a bounded
//!    grace period for each to finish its cleanup, and aborts stragglers
//!    before returning.
//!
//! A bind failure is the only error that escapes to the caller. Accept
//! errors are transient (file-descriptor exhaustion and the like) and are
//! logged without stopping the loop; everything that happens inside a
//! session stays inside that session.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use homelink_core::{BridgeMessage, EntitySnapshot, ProtocolError};

use crate::application::{CommandExecutor, EntitySnapshotProvider, InitialStateProvider};
use crate::domain::BridgeConfig;
use crate::infrastructure::broadcast::BroadcastBus;
use crate::infrastructure::session::{handle_connection, SessionContext};

/// Error type for the bridge server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound. Fatal at startup.
    #[error("failed to bind bridge listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called on a server that is already running.
    #[error("bridge server already started")]
    AlreadyStarted,
}

/// The TCP session manager.
///
/// Construct once, `start()` to begin accepting, `close()` to stop. All
/// methods take `&self`; the server is designed to sit in an `Arc` shared
/// with whatever pushes broadcasts into it.
pub struct BridgeServer {
    config: Arc<BridgeConfig>,
    bus: Arc<BroadcastBus>,
    entities: Arc<dyn EntitySnapshotProvider>,
    commands: Arc<dyn CommandExecutor>,
    initial_state: Option<Arc<dyn InitialStateProvider>>,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    sessions: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BridgeServer {
    /// Creates a server around the injected collaborators.
    pub fn new(
        config: BridgeConfig,
        entities: Arc<dyn EntitySnapshotProvider>,
        commands: Arc<dyn CommandExecutor>,
        initial_state: Option<Arc<dyn InitialStateProvider>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            bus: Arc::new(BroadcastBus::new()),
            entities,
            commands,
            initial_state,
            shutdown,
            accept_task: Mutex::new(None),
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// Returns the bound address (useful when the configuration requested
    /// port 0).
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address is unavailable — fatal, and
    /// surfaced to whoever starts the bridge. [`ServerError::AlreadyStarted`]
    /// on a second call.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr,
            source,
        })?;

        let mut slot = self.accept_task.lock().unwrap();
        if slot.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        info!("bridge listening on {local_addr}");
        *slot = Some(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.config),
            Arc::clone(&self.bus),
            Arc::clone(&self.entities),
            Arc::clone(&self.commands),
            self.initial_state.clone(),
            self.shutdown.subscribe(),
            Arc::clone(&self.sessions),
        )));
        Ok(local_addr)
    }

    /// Fans a message out to every streaming session. Pass-through over the
    /// broadcast bus; returns the number of sessions that accepted it.
    pub fn broadcast(&self, msg: &BridgeMessage) -> Result<usize, ProtocolError> {
        self.bus.broadcast(msg)
    }

    /// Fans out the current entity list, for configuration-change events.
    pub fn broadcast_entity_list(
        &self,
        entities: Vec<EntitySnapshot>,
    ) -> Result<usize, ProtocolError> {
        self.bus.broadcast_entity_list(entities)
    }

    /// Number of sessions currently registered for broadcasts.
    pub fn session_count(&self) -> usize {
        self.bus.len()
    }

    /// Stops accepting, closes every active session, and waits — bounded by
    /// the configured grace period per session — for their cleanup. Safe to
    /// call more than once; returns only after all per-connection resources
    /// are released.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);

        let accept = self.accept_task.lock().unwrap().take();
        if let Some(handle) = accept {
            let _ = handle.await;
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.drain(..).collect()
        };
        for mut handle in handles {
            if timeout(self.config.shutdown_grace, &mut handle).await.is_err() {
                warn!("session did not stop within grace period; aborting");
                handle.abort();
                let _ = handle.await;
            }
        }

        // Aborted sessions may have skipped deregistration.
        self.bus.clear();
        info!("bridge server stopped");
    }
}

/// The accept loop: runs until the shutdown flag flips.
#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    bus: Arc<BroadcastBus>,
    entities: Arc<dyn EntitySnapshotProvider>,
    commands: Arc<dyn CommandExecutor>,
    initial_state: Option<Arc<dyn InitialStateProvider>>,
    mut shutdown: watch::Receiver<bool>,
    sessions: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("client connected: {peer}");
                    let ctx = SessionContext {
                        config: Arc::clone(&config),
                        bus: Arc::clone(&bus),
                        entities: Arc::clone(&entities),
                        commands: Arc::clone(&commands),
                        initial_state: initial_state.clone(),
                        shutdown: shutdown.clone(),
                    };
                    let handle = tokio::spawn(handle_connection(stream, peer, ctx));
                    let mut sessions = sessions.lock().unwrap();
                    // Completed sessions leave finished handles behind; prune
                    // them here so the vector tracks live connections only.
                    sessions.retain(|h| !h.is_finished());
                    sessions.push(handle);
                }
                Err(e) => {
                    // Transient (e.g. out of file descriptors): keep listening.
                    error!("accept error: {e}");
                }
            },
        }
    }
    debug!("accept loop stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct NoEntities;
    impl EntitySnapshotProvider for NoEntities {
        fn entities(&self) -> Vec<EntitySnapshot> {
            Vec::new()
        }
    }

    struct NullExecutor;
    #[async_trait::async_trait]
    impl CommandExecutor for NullExecutor {
        async fn execute(
            &self,
            _entity_id: &str,
            _command: &str,
            _args: serde_json::Map<String, serde_json::Value>,
        ) -> Result<(), crate::application::CommandError> {
            Ok(())
        }
    }

    fn make_server(bind_addr: SocketAddr) -> BridgeServer {
        let config = BridgeConfig {
            bind_addr,
            ..BridgeConfig::default()
        };
        BridgeServer::new(config, Arc::new(NoEntities), Arc::new(NullExecutor), None)
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port() {
        let server = make_server("127.0.0.1:0".parse().unwrap());
        let addr = server.start().await.expect("bind must succeed");
        assert_ne!(addr.port(), 0);
        server.close().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let server = make_server("127.0.0.1:0".parse().unwrap());
        server.start().await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(ServerError::AlreadyStarted)
        ));
        server.close().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal_and_reported() {
        let first = make_server("127.0.0.1:0".parse().unwrap());
        let addr = first.start().await.unwrap();

        let second = make_server(addr);
        assert!(matches!(
            second.start().await,
            Err(ServerError::Bind { .. })
        ));
        first.close().await;
    }

    #[tokio::test]
    async fn test_close_without_start_is_safe() {
        let server = make_server("127.0.0.1:0".parse().unwrap());
        server.close().await;
        server.close().await;
    }

    #[tokio::test]
    async fn test_broadcast_with_no_sessions_delivers_to_nobody() {
        let server = make_server("127.0.0.1:0".parse().unwrap());
        assert_eq!(server.broadcast(&BridgeMessage::Ping).unwrap(), 0);
        assert_eq!(server.session_count(), 0);
    }
}
