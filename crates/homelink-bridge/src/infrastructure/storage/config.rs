//! TOML-based configuration for the standalone bridge.
//!
//! Example file:
//!
//! ```toml
//! [bridge]
//! name = "Living Room Bridge"
//! id = "3e9a2c1f-8d41-4a7b-9b1e-6f2d8c0a5e77"
//! port = 8323
//! bind = "0.0.0.0"
//! token = "correct-horse-battery-staple"
//!
//! [[entity]]
//! entity_id = "light.kitchen"
//! friendly_name = "Kitchen Light"
//! state = "off"
//!
//! [entity.features]
//! brightness = true
//! ```
//!
//! Every field is optional: `#[serde(default = ...)]` supplies the value
//! when a field is absent, so the bridge works on first run and when
//! upgrading from an older file that is missing newer fields.
//!
//! # The bridge id is persistent
//!
//! Hubs key their pairing records on `BRIDGE-ID`/`USN`, so the id must
//! survive restarts. [`load_or_init`] generates a UUID on first run and
//! writes it back to the file immediately.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::registry::EntityDefinition;
use crate::domain::config::{BridgeConfig, DEFAULT_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `bind` + `port` do not form a valid socket address.
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub bridge: BridgeSection,
    /// Entities served by the standalone registry.
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntityEntry>,
}

/// The `[bridge]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// Display name shown by hubs during setup.
    #[serde(default = "default_name")]
    pub name: String,
    /// Persistent bridge id; generated on first run when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// TCP port for the bridge protocol.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address. `"0.0.0.0"` accepts connections on all interfaces.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret; presence makes authentication mandatory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            id: None,
            port: default_port(),
            bind: default_bind(),
            token: None,
        }
    }
}

/// One `[[entity]]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityEntry {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "toml::value::Table::is_empty")]
    pub features: toml::value::Table,
}

fn default_name() -> String {
    "HomeLink Bridge".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

impl FileConfig {
    /// Converts the file into the runtime [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBindAddress`] when `bind`/`port` cannot form a
    /// socket address. An absent id falls back to empty; callers should use
    /// [`load_or_init`] so the id is already populated.
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let addr = format!("{}:{}", self.bridge.bind, self.bridge.port);
        let bind_addr: SocketAddr = addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(addr))?;

        Ok(BridgeConfig {
            bind_addr,
            bridge_id: self.bridge.id.clone().unwrap_or_default(),
            bridge_name: self.bridge.name.clone(),
            auth_token: self.bridge.token.clone(),
            ..BridgeConfig::default()
        })
    }

    /// Entity definitions for the standalone registry.
    pub fn entity_definitions(&self) -> Vec<EntityDefinition> {
        self.entities
            .iter()
            .map(|entry| EntityDefinition {
                entity_id: entry.entity_id.clone(),
                friendly_name: entry.friendly_name.clone(),
                state: entry.state.clone(),
                features: toml_table_to_json(&entry.features),
            })
            .collect()
    }
}

/// TOML tables and JSON objects share a data model; this losslessly carries
/// feature declarations across.
fn toml_table_to_json(table: &toml::value::Table) -> serde_json::Map<String, serde_json::Value> {
    serde_json::to_value(table)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default()
}

// ── File operations ───────────────────────────────────────────────────────────

/// Reads and parses the config file.
pub fn load(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

/// Serializes and writes the config file, creating parent directories.
pub fn save(path: &Path, config: &FileConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the config file, starting from defaults when it does not exist,
/// and guarantees a persistent bridge id: a missing id is generated and the
/// file written back before returning.
pub fn load_or_init(path: &Path) -> Result<FileConfig, ConfigError> {
    let mut config = if path.exists() {
        load(path)?
    } else {
        info!("no config at {}; creating one with defaults", path.display());
        FileConfig::default()
    };

    if config.bridge.id.is_none() {
        config.bridge.id = Some(Uuid::new_v4().to_string());
        save(path, &config)?;
        info!("generated bridge id {}", config.bridge.id.as_deref().unwrap_or(""));
    }

    Ok(config)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_parses_to_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.bridge.name, "HomeLink Bridge");
        assert_eq!(config.bridge.port, DEFAULT_PORT);
        assert_eq!(config.bridge.bind, "0.0.0.0");
        assert!(config.bridge.id.is_none());
        assert!(config.bridge.token.is_none());
        assert!(config.entities.is_empty());
    }

    #[test]
    fn test_partial_bridge_table_fills_missing_fields() {
        let config: FileConfig = toml::from_str("[bridge]\nport = 9000\n").unwrap();
        assert_eq!(config.bridge.port, 9000);
        assert_eq!(config.bridge.name, "HomeLink Bridge");
    }

    #[test]
    fn test_entities_parse_with_features() {
        let text = r#"
            [[entity]]
            entity_id = "light.kitchen"
            friendly_name = "Kitchen Light"
            state = "on"

            [entity.features]
            brightness = true
            min_mireds = 153

            [[entity]]
            entity_id = "switch.fan"
        "#;
        let config: FileConfig = toml::from_str(text).unwrap();
        assert_eq!(config.entities.len(), 2);

        let defs = config.entity_definitions();
        assert_eq!(defs[0].entity_id, "light.kitchen");
        assert_eq!(defs[0].features["brightness"], true);
        assert_eq!(defs[0].features["min_mireds"], 153);
        assert!(defs[1].features.is_empty());
    }

    #[test]
    fn test_to_bridge_config_combines_bind_and_port() {
        let config: FileConfig =
            toml::from_str("[bridge]\nbind = \"127.0.0.1\"\nport = 9000\n").unwrap();
        let bridge = config.to_bridge_config().unwrap();
        assert_eq!(bridge.bind_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_to_bridge_config_rejects_bad_bind() {
        let config: FileConfig = toml::from_str("[bridge]\nbind = \"not.an.ip\"\n").unwrap();
        assert!(matches!(
            config.to_bridge_config(),
            Err(ConfigError::InvalidBindAddress(_))
        ));
    }

    #[test]
    fn test_token_presence_enables_auth() {
        let config: FileConfig = toml::from_str("[bridge]\ntoken = \"s3cret\"\n").unwrap();
        let bridge = config.to_bridge_config().unwrap();
        assert!(bridge.auth_enabled());
        assert_eq!(bridge.auth_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_load_or_init_generates_and_persists_id() {
        let path = std::env::temp_dir().join(format!("homelink-test-{}.toml", Uuid::new_v4()));

        let first = load_or_init(&path).unwrap();
        let id = first.bridge.id.clone().expect("id must be generated");

        // A second load sees the same id — it was written to disk.
        let second = load_or_init(&path).unwrap();
        assert_eq!(second.bridge.id.as_deref(), Some(id.as_str()));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_round_trip_preserves_entities() {
        let path = std::env::temp_dir().join(format!("homelink-test-{}.toml", Uuid::new_v4()));

        let mut config = FileConfig::default();
        config.bridge.id = Some("fixed-id".to_string());
        config.entities.push(EntityEntry {
            entity_id: "light.kitchen".to_string(),
            friendly_name: Some("Kitchen".to_string()),
            state: None,
            features: toml::value::Table::new(),
        });

        save(&path, &config).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_file(&path).ok();
    }
}
