//! SSDP discovery responder.
//!
//! Joins the standard SSDP multicast group and answers M-SEARCH queries for
//! the bridge's service type with a unicast reply carrying the bridge
//! identity (see `homelink_core::protocol::ssdp` for the accept/ignore
//! rules and reply format). Discovery is best-effort end to end: parse
//! failures, foreign queries, and send failures are all swallowed — a hub
//! that misses a reply simply asks again.
//!
//! # Socket setup
//!
//! The receive socket is built with `socket2` so we can set `SO_REUSEADDR`
//! before binding: other UPnP services on the host commonly share port 1900.
//! When 1900 is taken anyway the responder falls back to an ephemeral port,
//! and group membership is attempted but not required — both degradations
//! leave the TCP bridge fully functional, so neither is fatal.
//!
//! Replies go out on a throwaway socket that is `connect`ed to the requester
//! first; that reveals which local address the reply will leave from, which
//! is what the informational `LOCATION` header embeds.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Mutex;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use homelink_core::protocol::ssdp;
use homelink_core::BridgeIdentity;

/// Error type for the discovery responder.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be created or bound at all.
    #[error("failed to set up SSDP socket: {0}")]
    Socket(#[from] std::io::Error),

    /// `start` was called on a responder that is already running.
    #[error("ssdp responder already started")]
    AlreadyStarted,
}

/// Passive SSDP responder for the bridge's service type.
pub struct SsdpResponder {
    identity: BridgeIdentity,
    bind_port: u16,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SsdpResponder {
    /// Creates a responder on the standard SSDP port.
    pub fn new(identity: BridgeIdentity) -> Self {
        Self::with_port(identity, ssdp::SSDP_PORT)
    }

    /// Creates a responder on a specific port. Port 0 binds ephemerally;
    /// used by tests and by deployments that remap 1900 externally.
    pub fn with_port(identity: BridgeIdentity, bind_port: u16) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            identity,
            bind_port,
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Binds the socket, joins the multicast group, and starts answering.
    /// Returns the bound local address.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::Socket`] when no UDP socket can be bound at all
    /// (binding falls back to an ephemeral port first, so this is rare).
    pub async fn start(&self) -> Result<SocketAddr, DiscoveryError> {
        let (socket, joined_group) = bind_ssdp_socket(self.bind_port)?;
        let socket = UdpSocket::from_std(socket)?;
        let local_addr = socket.local_addr()?;

        let mut slot = self.task.lock().unwrap();
        if slot.is_some() {
            return Err(DiscoveryError::AlreadyStarted);
        }

        if local_addr.port() != ssdp::SSDP_PORT {
            warn!(
                "ssdp responder bound to {local_addr} instead of port {}; \
                 multicast queries may not arrive",
                ssdp::SSDP_PORT
            );
        }
        info!("ssdp responder listening on {local_addr}");

        *slot = Some(tokio::spawn(respond_loop(
            socket,
            self.identity.clone(),
            joined_group,
            self.shutdown.subscribe(),
        )));
        Ok(local_addr)
    }

    /// Leaves the group and closes the socket. Safe to call repeatedly.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().unwrap().take();
        if let Some(handle) = task {
            let _ = handle.await;
        }
    }
}

/// Builds the std UDP socket for receiving SSDP queries.
///
/// Returns the socket plus the multicast group it joined, if joining
/// succeeded.
fn bind_ssdp_socket(port: u16) -> std::io::Result<(std::net::UdpSocket, Option<Ipv4Addr>)> {
    // Compile-time-known valid address literal.
    let group: Ipv4Addr = ssdp::SSDP_MULTICAST_ADDR.parse().unwrap();

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    let preferred = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    if socket.bind(&preferred.into()).is_err() {
        // Port taken (another UPnP stack, usually). Fall back to ephemeral.
        let fallback = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        socket.bind(&fallback.into())?;
    }

    let joined_group = match socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
        Ok(()) => Some(group),
        Err(e) => {
            warn!("could not join SSDP multicast group: {e}");
            None
        }
    };

    socket.set_nonblocking(true)?;
    Ok((socket.into(), joined_group))
}

/// The receive loop, one task per responder.
async fn respond_loop(
    socket: UdpSocket,
    identity: BridgeIdentity,
    joined_group: Option<Ipv4Addr>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; 2048];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => handle_datagram(&buf[..len], src, &identity).await,
                Err(e) => debug!("ssdp recv error: {e}"),
            },
        }
    }

    if let Some(group) = joined_group {
        let _ = socket.leave_multicast_v4(group, Ipv4Addr::UNSPECIFIED);
    }
    info!("ssdp responder stopped");
}

/// Classifies one datagram and replies when it is a matching query.
async fn handle_datagram(datagram: &[u8], src: SocketAddr, identity: &BridgeIdentity) {
    // Not text, not SSDP, or not for us: drop without a word. The multicast
    // group carries constant chatter from every UPnP device on the LAN.
    let Ok(text) = std::str::from_utf8(datagram) else {
        return;
    };
    let Some(request) = ssdp::parse_search(text) else {
        return;
    };
    if !request.wants_reply() {
        return;
    }

    debug!("ssdp discovery query from {src} (st={})", request.search_target);
    send_reply(src, identity).await;
}

/// Sends the unicast reply on a throwaway socket. Every failure on this
/// path is swallowed; discovery offers no delivery guarantee.
async fn send_reply(dest: SocketAddr, identity: &BridgeIdentity) {
    let Ok(socket) = UdpSocket::bind("0.0.0.0:0").await else {
        return;
    };
    if socket.connect(dest).await.is_err() {
        return;
    }

    // Connecting reveals which local address the reply leaves from; that is
    // the address LOCATION advertises.
    let replying_ip = socket
        .local_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let payload = ssdp::build_response(identity, replying_ip);
    if let Err(e) = socket.send(payload.as_bytes()).await {
        debug!("ssdp reply to {dest} failed: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
