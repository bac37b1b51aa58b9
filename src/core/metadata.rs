//! Protocol tags and the self-describing protocol registry.
//!
//! Every protocol the gateway knows about has a registry entry, including
//! the registered-but-unimplemented slots (Modbus, MQTT). The registry is
//! what the external API layer queries for discovery and validation, and
//! it owns the built-in default config each source config is merged over.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolConfig;

/// Protocol tag.
///
/// Tags are stable wire identifiers; a tag existing does not imply the
/// adapter is implemented (see [`ProtocolMetadata::implemented`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// OPC UA (session-oriented, synchronous read/write).
    #[serde(rename = "OPC_UA")]
    OpcUa,

    /// OPC Classic / DA (registered, driver not available).
    #[serde(rename = "OPC_CLASSIC")]
    OpcClassic,

    /// Push-style duplex-socket protocol over WebSocket.
    #[serde(rename = "WEBSOCKET")]
    WebSocket,

    /// Modbus TCP (registered slot, not implemented).
    #[serde(rename = "MODBUS")]
    Modbus,

    /// MQTT publish/subscribe (registered slot, not implemented).
    #[serde(rename = "MQTT")]
    Mqtt,
}

impl Protocol {
    /// Stable tag string (matches the serde representation).
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::OpcUa => "OPC_UA",
            Self::OpcClassic => "OPC_CLASSIC",
            Self::WebSocket => "WEBSOCKET",
            Self::Modbus => "MODBUS",
            Self::Mqtt => "MQTT",
        }
    }

    /// Registry metadata for this protocol.
    pub fn metadata(&self) -> &'static ProtocolMetadata {
        registry()
            .get(*self)
            .expect("every Protocol variant has a registry entry")
    }

    /// Built-in default config for this protocol.
    pub fn default_config(&self) -> &'static ProtocolConfig {
        &self.metadata().default_config
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPC_UA" => Ok(Self::OpcUa),
            "OPC_CLASSIC" => Ok(Self::OpcClassic),
            "WEBSOCKET" => Ok(Self::WebSocket),
            "MODBUS" => Ok(Self::Modbus),
            "MQTT" => Ok(Self::Mqtt),
            other => Err(format!("unknown protocol tag: {}", other)),
        }
    }
}

/// Metadata for a protocol registry entry.
#[derive(Debug, Clone)]
pub struct ProtocolMetadata {
    /// The protocol tag.
    pub protocol: Protocol,

    /// Human-readable display name.
    pub display_name: &'static str,

    /// Description of the protocol.
    pub description: &'static str,

    /// Whether an adapter exists. Unimplemented slots stay in the registry
    /// so the API layer can list them, but the factory rejects them.
    pub implemented: bool,

    /// Built-in default configuration merged under every source config.
    pub default_config: ProtocolConfig,
}

/// Registry of all known protocols.
pub struct ProtocolRegistry {
    entries: Vec<ProtocolMetadata>,
}

impl ProtocolRegistry {
    /// All registry entries, in stable order.
    pub fn protocols(&self) -> &[ProtocolMetadata] {
        &self.entries
    }

    /// Look up the entry for a tag.
    pub fn get(&self, protocol: Protocol) -> Option<&ProtocolMetadata> {
        self.entries.iter().find(|e| e.protocol == protocol)
    }

    /// Tags with an implemented adapter, in registry order.
    pub fn supported(&self) -> Vec<Protocol> {
        self.entries
            .iter()
            .filter(|e| e.implemented)
            .map(|e| e.protocol)
            .collect()
    }
}

static REGISTRY: Lazy<ProtocolRegistry> = Lazy::new(|| ProtocolRegistry {
    entries: vec![
        ProtocolMetadata {
            protocol: Protocol::OpcUa,
            display_name: "OPC UA",
            description: "Session-oriented client: authenticated session, synchronous \
                          node read/write addressed by NodeId.",
            implemented: cfg!(feature = "opcua"),
            default_config: ProtocolConfig::new()
                .with("namespace_index", 2)
                .with("security_mode", "NONE")
                .with("connect_timeout_ms", 10_000u64)
                .with("session_timeout_ms", 60_000u64)
                .with("trust_server_certs", true),
        },
        ProtocolMetadata {
            protocol: Protocol::OpcClassic,
            display_name: "OPC Classic",
            description: "OPC DA over COM/DCOM. The contract is satisfied by a stub \
                          adapter; read/write/subscribe report unsupported.",
            implemented: true,
            default_config: ProtocolConfig::new().with("prog_id", "OPC.Server"),
        },
        ProtocolMetadata {
            protocol: Protocol::WebSocket,
            display_name: "WebSocket",
            description: "Persistent duplex socket with a background receive loop; \
                          reads and writes send request frames, values arrive as \
                          push frames routed by address.",
            implemented: cfg!(feature = "websocket"),
            default_config: ProtocolConfig::new()
                .with("connect_timeout_ms", 10_000u64)
                .with("buffer_size", 256u64),
        },
        ProtocolMetadata {
            protocol: Protocol::Modbus,
            display_name: "Modbus TCP",
            description: "Register-based polling protocol. Registered slot, adapter \
                          not implemented.",
            implemented: false,
            default_config: ProtocolConfig::new()
                .with("unit_id", 1)
                .with("port", 502),
        },
        ProtocolMetadata {
            protocol: Protocol::Mqtt,
            display_name: "MQTT",
            description: "Publish/subscribe protocol. Registered slot, adapter not \
                          implemented.",
            implemented: false,
            default_config: ProtocolConfig::new()
                .with("topic", "")
                .with("qos", 0)
                .with("retained", false),
        },
    ],
});

/// Access the process-wide protocol registry.
pub fn registry() -> &'static ProtocolRegistry {
    &REGISTRY
}
