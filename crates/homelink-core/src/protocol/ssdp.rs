//! SSDP discovery: M-SEARCH parsing and unicast reply construction.
//!
//! Hubs locate the bridge by multicasting an `M-SEARCH` request to the
//! standard SSDP group. The bridge answers its own service type (or the
//! `ssdp:all` wildcard) with a unicast reply that carries the bridge
//! identity in `BRIDGE-*` headers. Hubs are expected to address the bridge
//! using the reply's *source IP*; the `LOCATION` header is informational.
//!
//! This module is pure text handling — the UDP socket lives in the bridge
//! crate — so the accept/ignore decision matrix is unit-testable without a
//! network.
//!
//! SSDP header names are case-insensitive (they are HTTP headers), so
//! parsing normalises them to uppercase.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::domain::identity::BridgeIdentity;
use crate::protocol::messages::PROTOCOL_VERSION;

/// Standard SSDP multicast group.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// Standard SSDP port.
pub const SSDP_PORT: u16 = 1900;

/// The service type this bridge answers for.
pub const SERVICE_TYPE: &str = "urn:homelink:service:bridge:1";

/// The "all services" wildcard search target.
pub const ST_WILDCARD: &str = "ssdp:all";

/// A parsed discovery query. Constructed per datagram, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// The `ST` header: which service type the requester is looking for.
    pub search_target: String,
    /// The `MAN` header; must mention `"ssdp:discover"` for a real query.
    pub man: String,
}

impl SearchRequest {
    /// Whether this bridge should answer the query: the search target names
    /// our service type (or the wildcard) *and* the mandatory extension
    /// header marks the datagram as a discovery request.
    pub fn wants_reply(&self) -> bool {
        (self.search_target == SERVICE_TYPE || self.search_target == ST_WILDCARD)
            && self.man.contains("ssdp:discover")
    }
}

/// Parses an SSDP datagram into a [`SearchRequest`].
///
/// Returns `None` for anything that is not an M-SEARCH request — other SSDP
/// verbs (`NOTIFY`), HTTP responses, and arbitrary noise on the multicast
/// group are all silently dropped by the responder.
pub fn parse_search(text: &str) -> Option<SearchRequest> {
    let mut lines = text.lines();
    let request_line = lines.next()?;
    if !request_line.trim_start().to_ascii_uppercase().starts_with("M-SEARCH") {
        return None;
    }

    let mut headers: HashMap<String, &str> = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_uppercase(), value.trim());
        }
    }

    Some(SearchRequest {
        search_target: headers.get("ST").copied().unwrap_or_default().to_string(),
        man: headers.get("MAN").copied().unwrap_or_default().to_string(),
    })
}

/// Builds the unicast reply for an accepted query.
///
/// `replying_ip` is the local address the reply leaves from; it is embedded
/// in the informational `LOCATION` header together with the bridge's TCP
/// port. The terminating blank line is included.
pub fn build_response(identity: &BridgeIdentity, replying_ip: IpAddr) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age=60\r\n\
         EXT:\r\n\
         ST: {st}\r\n\
         USN: uuid:{id}\r\n\
         SERVER: {product}/{version} UPnP/1.1 HomeLink\r\n\
         BRIDGE-ID: {id}\r\n\
         BRIDGE-NAME: {name}\r\n\
         BRIDGE-PORT: {port}\r\n\
         LOCATION: homelink://{ip}:{port}\r\n\
         \r\n",
        st = SERVICE_TYPE,
        id = identity.id,
        product = crate::protocol::messages::BRIDGE_PRODUCT,
        version = PROTOCOL_VERSION,
        name = identity.name,
        port = identity.port,
        ip = replying_ip,
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
