//! Broadcast bus: fan-out of one message to every registered session sink.
//!
//! Each streaming session registers a bounded queue here; its writer task
//! drains the queue onto the socket. Broadcasting serializes the message
//! once and `try_send`s the identical line to every queue — no socket I/O
//! ever happens under the registry lock, and a sink that cannot accept the
//! line (queue full, or the session already gone) is evicted within the same
//! broadcast call while delivery proceeds to the rest. A slow client can
//! therefore only ever lose its own membership, never delay other sessions.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use homelink_core::{encode_line, BridgeMessage, EntitySnapshot, ProtocolError};

/// Identifies one registered session sink.
pub type SessionId = Uuid;

/// Depth of each per-session outbound queue. Bounds how far a slow client
/// can fall behind before it is evicted.
pub const SINK_QUEUE_DEPTH: usize = 64;

/// Registry of connected session sinks.
///
/// `register`, `deregister`, and `broadcast` are the only operations that
/// touch the registry, and the internal mutex is the sole synchronization
/// boundary for membership.
#[derive(Default)]
pub struct BroadcastBus {
    sinks: Mutex<HashMap<SessionId, mpsc::Sender<String>>>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session and returns the receiving end of its sink queue.
    ///
    /// Registering the same id again replaces the previous sink (the old
    /// receiver sees its channel close).
    pub fn register(&self, id: SessionId) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(SINK_QUEUE_DEPTH);
        let previous = self.sinks.lock().unwrap().insert(id, tx);
        if previous.is_some() {
            warn!("session {id} registered twice; replacing previous sink");
        }
        rx
    }

    /// Removes a session sink. Returns whether it was still registered —
    /// `false` when the sink was already evicted by a failed broadcast,
    /// which makes session cleanup idempotent.
    pub fn deregister(&self, id: &SessionId) -> bool {
        self.sinks.lock().unwrap().remove(id).is_some()
    }

    /// Serializes `msg` once and delivers the identical line to every
    /// registered sink. Returns the number of sinks that accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] only when the message itself cannot be
    /// serialized — a construction bug, surfaced here rather than swallowed
    /// inside a best-effort send.
    pub fn broadcast(&self, msg: &BridgeMessage) -> Result<usize, ProtocolError> {
        let line = encode_line(msg)?;
        Ok(self.broadcast_line(&line))
    }

    /// Convenience wrapper: broadcast the current entity list.
    pub fn broadcast_entity_list(
        &self,
        entities: Vec<EntitySnapshot>,
    ) -> Result<usize, ProtocolError> {
        self.broadcast(&BridgeMessage::EntityList { entities })
    }

    /// Delivers an already-encoded line to every sink, evicting those that
    /// cannot accept it.
    pub fn broadcast_line(&self, line: &str) -> usize {
        let mut sinks = self.sinks.lock().unwrap();
        let mut evicted: Vec<SessionId> = Vec::new();
        let mut delivered = 0usize;

        for (id, tx) in sinks.iter() {
            match tx.try_send(line.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("session {id} cannot keep up; evicting from broadcast");
                    evicted.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("session {id} sink closed; evicting from broadcast");
                    evicted.push(*id);
                }
            }
        }

        for id in evicted {
            sinks.remove(&id);
        }
        delivered
    }

    /// Number of currently registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every sink. Used when the listener shuts down after the grace
    /// period so aborted sessions cannot leave stale entries behind.
    pub fn clear(&self) {
        self.sinks.lock().unwrap().clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_identical_line_to_all_sinks() {
        let bus = BroadcastBus::new();
        let mut rx1 = bus.register(Uuid::new_v4());
        let mut rx2 = bus.register(Uuid::new_v4());

        let delivered = bus.broadcast(&BridgeMessage::Pong).unwrap();
        assert_eq!(delivered, 2);

        let line1 = rx1.recv().await.unwrap();
        let line2 = rx2.recv().await.unwrap();
        assert_eq!(line1, line2);
        assert_eq!(line1, "{\"type\":\"pong\"}\n");
    }

    #[tokio::test]
    async fn test_dead_sink_is_evicted_without_blocking_others() {
        let bus = BroadcastBus::new();
        let id_dead = Uuid::new_v4();
        let rx_dead = bus.register(id_dead);
        let mut rx_live = bus.register(Uuid::new_v4());

        // Simulate a session that terminated without deregistering.
        drop(rx_dead);

        let delivered = bus.broadcast(&BridgeMessage::Ping).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(bus.len(), 1);
        assert!(rx_live.recv().await.is_some());

        // The evicted session's cleanup is still safe.
        assert!(!bus.deregister(&id_dead));
    }

    #[tokio::test]
    async fn test_slow_sink_with_full_queue_is_evicted() {
        let bus = BroadcastBus::new();
        let _rx_slow = bus.register(Uuid::new_v4()); // never drained
        let mut rx_live = bus.register(Uuid::new_v4());

        // Fill the slow sink's queue to the brim...
        for _ in 0..SINK_QUEUE_DEPTH {
            bus.broadcast(&BridgeMessage::Ping).unwrap();
            assert!(rx_live.recv().await.is_some());
        }
        assert_eq!(bus.len(), 2);

        // ...and the next broadcast evicts it while the live sink still
        // receives the message.
        let delivered = bus.broadcast(&BridgeMessage::Pong).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(bus.len(), 1);
        assert!(rx_live.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let bus = BroadcastBus::new();
        let id = Uuid::new_v4();
        let _rx = bus.register(id);

        assert!(bus.deregister(&id));
        assert!(!bus.deregister(&id));
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_entity_list_reaches_sinks() {
        let bus = BroadcastBus::new();
        let mut rx = bus.register(Uuid::new_v4());

        bus.broadcast_entity_list(vec![EntitySnapshot::new(
            "light.kitchen",
            "light",
            "Kitchen",
        )])
        .unwrap();

        let line = rx.recv().await.unwrap();
        assert!(line.contains("\"type\":\"entity_list\""));
        assert!(line.contains("light.kitchen"));
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_bus_is_a_no_op() {
        let bus = BroadcastBus::new();
        assert_eq!(bus.broadcast(&BridgeMessage::Ping).unwrap(), 0);
    }
}
