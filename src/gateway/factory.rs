//! Adapter factory.
//!
//! Maps a protocol tag to an adapter constructor. Unknown or unimplemented
//! tags are an explicit [`GatewayError::UnsupportedProtocol`] outcome, not
//! a panic; the registry keeps their metadata visible either way.

use tracing::warn;

use crate::core::config::SourceDescriptor;
use crate::core::error::{GatewayError, Result};
use crate::core::metadata::{registry, Protocol};
use crate::core::traits::DataClient;
use crate::protocols::opc_classic::OpcClassicClient;

/// Build the adapter for a source descriptor.
pub fn create_client(descriptor: &SourceDescriptor) -> Result<Box<dyn DataClient>> {
    match descriptor.protocol {
        #[cfg(feature = "opcua")]
        Protocol::OpcUa => Ok(Box::new(crate::protocols::opcua::OpcUaClient::new(
            descriptor,
        ))),

        #[cfg(feature = "websocket")]
        Protocol::WebSocket => Ok(Box::new(crate::protocols::websocket::WebSocketClient::new(
            descriptor,
        ))),

        Protocol::OpcClassic => Ok(Box::new(OpcClassicClient::new(descriptor))),

        other => {
            warn!(
                source_id = %descriptor.id,
                protocol = %other,
                "no adapter for protocol"
            );
            Err(GatewayError::UnsupportedProtocol(other.tag().to_string()))
        }
    }
}

/// Protocol tags with an implemented adapter, in registry order.
pub fn supported_protocols() -> Vec<Protocol> {
    registry().supported()
}
