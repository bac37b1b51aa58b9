//! Source and protocol configuration.
//!
//! A source is described by a [`SourceDescriptor`]: the unique id the rest
//! of the system keys on, the protocol tag, the endpoint, optional
//! credentials, and a flat protocol-specific config map. The map is merged
//! over the protocol's built-in defaults key by key (shallow merge, user
//! keys winning) before an adapter is built.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::core::metadata::Protocol;

/// Flat protocol-specific configuration map.
///
/// Keys are protocol-defined (e.g. `namespace_index` for OPC UA,
/// `connect_timeout_ms` for the duplex-socket adapter). Values are JSON
/// scalars; nested objects are not merged, only replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolConfig(Map<String, JsonValue>);

impl ProtocolConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the config has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set a key, replacing any existing value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style set.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Get a raw JSON value.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Get a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    /// Get a u16 value (accepts any JSON integer in range).
    pub fn get_u16(&self, key: &str) -> Option<u16> {
        self.0
            .get(key)
            .and_then(JsonValue::as_u64)
            .and_then(|v| u16::try_from(v).ok())
    }

    /// Get a u64 value.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(JsonValue::as_u64)
    }

    /// Get a bool value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(JsonValue::as_bool)
    }

    /// Shallow-merge this config over `defaults`.
    ///
    /// Every key of `defaults` that this config does not define is copied
    /// in; keys defined here win. Values are not deep-merged.
    #[must_use]
    pub fn merged_over(&self, defaults: &ProtocolConfig) -> ProtocolConfig {
        let mut merged = defaults.0.clone();
        for (k, v) in &self.0 {
            merged.insert(k.clone(), v.clone());
        }
        ProtocolConfig(merged)
    }

    /// Iterate over key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, JsonValue)> for ProtocolConfig {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A configured external data endpoint.
///
/// The `id` is the unique key used everywhere else; the manager maps it to
/// at most one live adapter at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique source id.
    pub id: String,

    /// Protocol tag.
    pub protocol: Protocol,

    /// Endpoint URL (e.g. "opc.tcp://192.168.1.100:4840", "ws://host:9000/data").
    pub endpoint: String,

    /// Username for authenticated protocols.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for authenticated protocols.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Protocol-specific configuration, merged over built-in defaults.
    #[serde(default)]
    pub config: ProtocolConfig,
}

impl SourceDescriptor {
    /// Create a descriptor with an empty config map.
    pub fn new(id: impl Into<String>, protocol: Protocol, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protocol,
            endpoint: endpoint.into(),
            username: None,
            password: None,
            config: ProtocolConfig::new(),
        }
    }

    /// Set credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the config map.
    #[must_use]
    pub fn with_config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    /// Source config merged over the protocol's built-in defaults.
    pub fn effective_config(&self) -> ProtocolConfig {
        self.config.merged_over(self.protocol.default_config())
    }
}
