//! The bridge's own identity, shared by the TCP and UDP components.

/// Identity advertised by this bridge process.
///
/// Built once at startup from configuration and then shared (cloned or via
/// `Arc`) with the TCP session manager and the SSDP responder. Immutable for
/// the lifetime of the process: hubs key their pairing records on `id`, so
/// it must come from persistent configuration rather than being regenerated
/// per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeIdentity {
    /// Stable unique identifier, also the basis of the SSDP `USN` header.
    pub id: String,
    /// Human-readable bridge name shown by hubs during setup.
    pub name: String,
    /// TCP port the bridge protocol listens on, advertised via `BRIDGE-PORT`.
    pub port: u16,
}

impl BridgeIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            port,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
