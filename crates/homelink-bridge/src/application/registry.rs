//! Standalone in-memory entity registry.
//!
//! Deployments embedded in a home-automation platform inject their own
//! collaborators; the standalone binary instead serves a fixed entity set
//! declared in the config file. This registry implements all three
//! collaborator seams over that set:
//!
//! - snapshots come from the declared entities, sorted by id;
//! - `turn_on` / `turn_off` / `toggle` flip the in-memory state and emit a
//!   `state` event on the outbound channel (the binary pumps that channel
//!   into the broadcast bus);
//! - initial-state replay reports the current state of every entity.
//!
//! Anything else — platform service calls, capability inference — is out of
//! scope for the standalone registry and yields [`CommandError::Unsupported`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use homelink_core::{BridgeMessage, EntitySnapshot};

use super::collaborators::{
    CommandError, CommandExecutor, EntitySnapshotProvider, InitialStateProvider,
};

/// Platform domains the standalone registry accepts.
pub const SUPPORTED_DOMAINS: [&str; 4] = ["light", "switch", "fan", "climate"];

/// One entity as declared in configuration.
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    /// Platform-scoped id, `<domain>.<object>`, e.g. `light.kitchen`.
    pub entity_id: String,
    /// Display name; defaults to the entity id when not declared.
    pub friendly_name: Option<String>,
    /// Starting state; defaults to `"off"`.
    pub state: Option<String>,
    /// Capability metadata forwarded verbatim in the entity list.
    pub features: Map<String, Value>,
}

/// Mutable per-entity record.
#[derive(Debug, Clone)]
struct EntityRecord {
    snapshot: EntitySnapshot,
    state: String,
    attributes: Map<String, Value>,
}

/// In-memory registry backing the standalone collaborators.
///
/// The record map is the only mutable state and is guarded by a `Mutex`
/// that is never held across an await point; the state-event channel send
/// happens after the lock is released.
pub struct EntityRegistry {
    records: Mutex<BTreeMap<String, EntityRecord>>,
    events: mpsc::Sender<BridgeMessage>,
}

impl EntityRegistry {
    /// Builds a registry from declared entities and returns it together with
    /// the receiver for the `state` events it emits.
    ///
    /// Entities whose id has no `domain.object` shape, or whose domain is
    /// not supported, are skipped with a warning rather than failing
    /// startup.
    pub fn new(
        definitions: Vec<EntityDefinition>,
    ) -> (Arc<Self>, mpsc::Receiver<BridgeMessage>) {
        let (tx, rx) = mpsc::channel(64);
        let mut records = BTreeMap::new();

        for def in definitions {
            let Some((domain, _)) = def.entity_id.split_once('.') else {
                warn!("skipping entity with malformed id: {}", def.entity_id);
                continue;
            };
            if !SUPPORTED_DOMAINS.contains(&domain) {
                warn!("skipping entity {} (unsupported domain {domain})", def.entity_id);
                continue;
            }

            let snapshot = EntitySnapshot {
                entity_id: def.entity_id.clone(),
                domain: domain.to_string(),
                friendly_name: def.friendly_name.unwrap_or_else(|| def.entity_id.clone()),
                features: def.features,
            };
            records.insert(
                def.entity_id.clone(),
                EntityRecord {
                    snapshot,
                    state: def.state.unwrap_or_else(|| "off".to_string()),
                    attributes: Map::new(),
                },
            );
        }

        let registry = Arc::new(Self {
            records: Mutex::new(records),
            events: tx,
        });
        (registry, rx)
    }

    /// Number of entities currently exposed.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a `state` message for one record.
    fn state_event(record: &EntityRecord) -> BridgeMessage {
        BridgeMessage::State {
            entity_id: record.snapshot.entity_id.clone(),
            state: record.state.clone(),
            attributes: record.attributes.clone(),
            ts: unix_now(),
        }
    }
}

impl EntitySnapshotProvider for EntityRegistry {
    fn entities(&self) -> Vec<EntitySnapshot> {
        self.records
            .lock()
            .unwrap()
            .values()
            .map(|record| record.snapshot.clone())
            .collect()
    }
}

impl InitialStateProvider for EntityRegistry {
    fn initial_states(&self) -> Vec<BridgeMessage> {
        self.records
            .lock()
            .unwrap()
            .values()
            .map(Self::state_event)
            .collect()
    }
}

#[async_trait]
impl CommandExecutor for EntityRegistry {
    async fn execute(
        &self,
        entity_id: &str,
        command: &str,
        args: Map<String, Value>,
    ) -> Result<(), CommandError> {
        let event = {
            let mut records = self.records.lock().unwrap();
            let record = records
                .get_mut(entity_id)
                .ok_or_else(|| CommandError::UnknownEntity(entity_id.to_string()))?;

            match command {
                "turn_on" => {
                    record.state = "on".to_string();
                    // Argument passthrough: brightness, percentage, setpoints
                    // and friends become visible state attributes.
                    for (key, value) in args {
                        record.attributes.insert(key, value);
                    }
                }
                "turn_off" => {
                    record.state = "off".to_string();
                }
                "toggle" => {
                    record.state = if record.state == "on" { "off" } else { "on" }.to_string();
                }
                _ => {
                    return Err(CommandError::Unsupported {
                        entity_id: entity_id.to_string(),
                        command: command.to_string(),
                    });
                }
            }

            debug!("entity {entity_id} -> {}", record.state);
            Self::state_event(record)
        };

        // Receiver gone means the bridge is shutting down; nothing to report.
        let _ = self.events.send(event).await;
        Ok(())
    }
}

/// Unix seconds at the time of the call.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
