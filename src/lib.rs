//! # Data Acquisition Gateway (daqgw)
//!
//! A uniform abstraction over heterogeneous industrial data sources.
//! One contract - connect, disconnect, read, write, subscribe - regardless
//! of the underlying wire protocol.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use daqgw::prelude::*;
//!
//! let manager = DataManager::new();
//!
//! let source = SourceDescriptor::new("plc1", Protocol::OpcUa, "opc.tcp://192.168.1.100:4840")
//!     .with_credentials("admin", "secret");
//! manager.add_server(&source).await;
//!
//! let outcome = manager.read("plc1", "ns=2;s=Flow", None).await?;
//! manager.subscribe("ws1", "sensor/temp", Arc::new(persist), None).await?;
//! ```
//!
//! ## Supported Protocols
//!
//! | Tag | Adapter | Status |
//! |-----|---------|--------|
//! | `OPC_UA` | session-oriented (`async-opcua`) | feature `opcua` |
//! | `WEBSOCKET` | duplex socket, push delivery | feature `websocket` |
//! | `OPC_CLASSIC` | stub (unsupported operations) | always |
//! | `MODBUS`, `MQTT` | registered slots | not implemented |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod gateway;
pub mod protocols;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        config::{ProtocolConfig, SourceDescriptor},
        data::{InboundMessage, Value},
        error::{GatewayError, Result},
        metadata::Protocol,
        quality::Quality,
        traits::{ConnectionState, DataClient, PushHandler, ReadOutcome},
    };
    pub use crate::gateway::{DataManager, SourceStatus};
}

// Re-export core types at crate root for convenience
pub use crate::core::config::{ProtocolConfig, SourceDescriptor};
pub use crate::core::data::{InboundMessage, Value};
pub use crate::core::error::{GatewayError, Result};
pub use crate::core::metadata::{registry, Protocol};
pub use crate::core::quality::Quality;
pub use crate::core::traits::{
    ConnectionState, DataClient, PushHandler, PushReceiver, ReadOutcome,
};
pub use crate::gateway::{create_client, supported_protocols, DataManager, SourceStatus};
