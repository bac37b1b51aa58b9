//! OPC Classic (DA) stub adapter.
//!
//! No OPC Classic driver is wired in, but the tag is a first-class citizen
//! of the gateway: the adapter satisfies the full [`DataClient`] contract
//! and reports a deterministic "operation unsupported" outcome for
//! read/write/subscribe instead of crashing or being special-cased by
//! callers. `connect` trivially succeeds because there is no transport to
//! open.

use tracing::{info, warn};

use crate::core::config::{ProtocolConfig, SourceDescriptor};
use crate::core::data::Value;
use crate::core::error::{GatewayError, Result};
use crate::core::metadata::Protocol;
use crate::core::traits::{ConnectionState, DataClient, PushReceiver, ReadOutcome};

const PROTOCOL_NAME: &str = "OPC Classic";

/// Stub adapter for OPC Classic sources.
pub struct OpcClassicClient {
    source_id: String,
    endpoint: String,
    /// ProgID of the COM server, kept for the day a driver shows up.
    prog_id: String,
    state: ConnectionState,
}

impl OpcClassicClient {
    /// Create a stub adapter from a source descriptor.
    pub fn new(descriptor: &SourceDescriptor) -> Self {
        let config = descriptor.effective_config();
        let prog_id = config
            .get_str("prog_id")
            .unwrap_or("OPC.Server")
            .to_string();

        Self {
            source_id: descriptor.id.clone(),
            endpoint: descriptor.endpoint.clone(),
            prog_id,
            state: ConnectionState::Disconnected,
        }
    }

    /// ProgID the stub was configured with.
    pub fn prog_id(&self) -> &str {
        &self.prog_id
    }

    fn unsupported(&self, operation: &'static str) -> GatewayError {
        warn!(
            source_id = %self.source_id,
            operation,
            "OPC Classic driver not available"
        );
        GatewayError::unsupported(PROTOCOL_NAME, operation)
    }
}

#[async_trait::async_trait]
impl DataClient for OpcClassicClient {
    fn protocol(&self) -> Protocol {
        Protocol::OpcClassic
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self) -> Result<()> {
        // No transport to open.
        self.state = ConnectionState::Connected;
        info!(
            source_id = %self.source_id,
            endpoint = %self.endpoint,
            prog_id = %self.prog_id,
            "OPC Classic stub connected"
        );
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.state.is_connected() {
            info!(source_id = %self.source_id, "OPC Classic stub disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    async fn read(
        &mut self,
        _address: &str,
        _overrides: Option<&ProtocolConfig>,
    ) -> Result<ReadOutcome> {
        Err(self.unsupported("read"))
    }

    async fn write(
        &mut self,
        _address: &str,
        _value: Value,
        _overrides: Option<&ProtocolConfig>,
    ) -> Result<()> {
        Err(self.unsupported("write"))
    }

    async fn subscribe(
        &mut self,
        _address: &str,
        _overrides: Option<&ProtocolConfig>,
    ) -> Result<PushReceiver> {
        Err(self.unsupported("subscribe"))
    }

    async fn unsubscribe(&mut self, _address: &str) -> Result<()> {
        Err(self.unsupported("unsubscribe"))
    }
}
