//! Entity descriptors forwarded to hubs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Description of one exposed device, as sent in `entity_list` messages.
///
/// The bridge treats this as an opaque record supplied by the entity
/// snapshot provider: it never inspects `features` or derives behaviour from
/// `domain`. Whatever the provider returns is what the hub sees.
///
/// # Wire form
///
/// ```json
/// {"entity_id":"light.kitchen","domain":"light","friendly_name":"Kitchen","features":{"brightness":true}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Platform-scoped identifier, e.g. `light.kitchen`.
    pub entity_id: String,
    /// The platform domain prefix, e.g. `light`, `switch`, `fan`, `climate`.
    pub domain: String,
    /// Human-readable label shown in the hub's device list.
    pub friendly_name: String,
    /// Capability metadata, forwarded verbatim.
    #[serde(default)]
    pub features: Map<String, Value>,
}

impl EntitySnapshot {
    /// Convenience constructor used by providers and tests.
    pub fn new(
        entity_id: impl Into<String>,
        domain: impl Into<String>,
        friendly_name: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            domain: domain.into(),
            friendly_name: friendly_name.into(),
            features: Map::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes_with_entity_id_field() {
        let snap = EntitySnapshot::new("light.kitchen", "light", "Kitchen");
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["entity_id"], "light.kitchen");
        assert_eq!(json["domain"], "light");
        assert_eq!(json["friendly_name"], "Kitchen");
    }

    #[test]
    fn test_snapshot_features_default_to_empty_map() {
        // A provider that omits features entirely must still deserialize.
        let snap: EntitySnapshot = serde_json::from_str(
            r#"{"entity_id":"switch.fan","domain":"switch","friendly_name":"Fan"}"#,
        )
        .unwrap();
        assert!(snap.features.is_empty());
    }

    #[test]
    fn test_snapshot_features_forwarded_verbatim() {
        let json = r#"{"entity_id":"light.desk","domain":"light","friendly_name":"Desk",
            "features":{"brightness":true,"min_mireds":153,"effect_list":["rainbow"]}}"#;
        let snap: EntitySnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.features["brightness"], true);
        assert_eq!(snap.features["min_mireds"], 153);
        // Round trip keeps the structure intact.
        let back = serde_json::to_string(&snap).unwrap();
        let again: EntitySnapshot = serde_json::from_str(&back).unwrap();
        assert_eq!(again, snap);
    }
}
