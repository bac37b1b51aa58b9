//! OPC UA session-oriented adapter.
//!
//! Wraps `async-opcua`: `connect` opens an (optionally authenticated)
//! session, `read`/`write` address a single node synchronously within it.
//! A dropped session is detected lazily - a failed service call flips the
//! state to Disconnected and the next read/write attempts one reconnect
//! before failing.
//!
//! Subscriptions are not wired for this adapter; `subscribe` reports an
//! unsupported operation. Push-style delivery is the duplex-socket
//! adapter's job.
//!
//! # Addressing
//!
//! Addresses are either full OPC UA node id strings (`ns=2;s=Flow`,
//! `ns=0;i=2258`) or bare identifiers resolved against the configured
//! `namespace_index` (numeric text becomes a numeric identifier).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use opcua::client::{ClientBuilder, IdentityToken, Session};
use opcua::crypto::SecurityPolicy;
use opcua::types::{
    AttributeId, DataValue, MessageSecurityMode, NodeId, QualifiedName, ReadValueId, StatusCode,
    TimestampsToReturn, UAString, UserTokenPolicy, Variant, WriteValue,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::config::{ProtocolConfig, SourceDescriptor};
use crate::core::data::Value;
use crate::core::error::{GatewayError, Result};
use crate::core::metadata::Protocol;
use crate::core::traits::{ConnectionState, DataClient, PushReceiver, ReadOutcome};

const PROTOCOL_NAME: &str = "OPC UA";
const APPLICATION_NAME: &str = "daqgw OPC UA Client";
const APPLICATION_URI: &str = "urn:daqgw:opcua:client";

/// Resolve an address string to a NodeId.
///
/// Full `ns=..;..` syntax is passed through; anything else becomes an
/// identifier in `default_ns` (numeric text as a numeric identifier).
fn parse_node_id(address: &str, default_ns: u16) -> NodeId {
    if let Ok(node_id) = NodeId::from_str(address) {
        return node_id;
    }
    if let Ok(numeric) = address.parse::<u32>() {
        return NodeId::new(default_ns, numeric);
    }
    NodeId::new(default_ns, address.to_string())
}

/// Convert an OPC UA variant into a gateway value.
fn variant_to_value(variant: &Variant) -> Value {
    match variant {
        Variant::Boolean(v) => Value::Bool(*v),
        Variant::SByte(v) => Value::Integer(*v as i64),
        Variant::Byte(v) => Value::Integer(*v as i64),
        Variant::Int16(v) => Value::Integer(*v as i64),
        Variant::UInt16(v) => Value::Integer(*v as i64),
        Variant::Int32(v) => Value::Integer(*v as i64),
        Variant::UInt32(v) => Value::Integer(*v as i64),
        Variant::Int64(v) => Value::Integer(*v),
        Variant::UInt64(v) => Value::Integer(*v as i64),
        Variant::Float(v) => Value::Float(*v as f64),
        Variant::Double(v) => Value::Float(*v),
        Variant::String(s) => Value::String(s.as_ref().to_string()),
        Variant::Empty => Value::Null,
        other => Value::String(format!("{:?}", other)),
    }
}

/// Coerce a gateway value into the variant the node's declared data type
/// expects. Without a declared type, the variant follows the value shape.
fn value_to_variant(value: &Value, data_type: Option<&str>) -> Result<Variant> {
    let conversion_err = |ty: &str| {
        GatewayError::TypeConversion(format!("cannot convert {:?} to {}", value, ty))
    };

    let Some(ty) = data_type else {
        return Ok(match value {
            Value::Float(v) => Variant::Double(*v),
            Value::Integer(v) => Variant::Int64(*v),
            Value::Bool(v) => Variant::Boolean(*v),
            Value::String(s) => Variant::String(UAString::from(s.as_str())),
            Value::Null => Variant::Empty,
        });
    };

    match ty.to_ascii_lowercase().as_str() {
        "double" => value
            .as_f64()
            .map(Variant::Double)
            .ok_or_else(|| conversion_err("double")),
        "float" => value
            .as_f64()
            .map(|v| Variant::Float(v as f32))
            .ok_or_else(|| conversion_err("float")),
        "int32" => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Variant::Int32)
            .ok_or_else(|| conversion_err("int32")),
        "int64" => value
            .as_i64()
            .map(Variant::Int64)
            .ok_or_else(|| conversion_err("int64")),
        "uint16" => value
            .as_i64()
            .and_then(|v| u16::try_from(v).ok())
            .map(Variant::UInt16)
            .ok_or_else(|| conversion_err("uint16")),
        "boolean" | "bool" => value
            .as_bool()
            .map(Variant::Boolean)
            .ok_or_else(|| conversion_err("boolean")),
        "string" => Ok(Variant::String(UAString::from(match value {
            Value::String(s) => s.clone(),
            other => other.to_json().to_string(),
        }))),
        other => Err(GatewayError::Config(format!(
            "unknown data_type '{}'",
            other
        ))),
    }
}

/// Session-oriented OPC UA adapter.
pub struct OpcUaClient {
    source_id: String,
    endpoint: String,
    /// Source config merged over protocol defaults.
    config: ProtocolConfig,
    identity: IdentityToken,
    connect_timeout: Duration,
    session: Option<Arc<Session>>,
    state: ConnectionState,
    event_loop_handle: Option<JoinHandle<StatusCode>>,
}

impl OpcUaClient {
    /// Create an adapter from a source descriptor. The session is opened
    /// by `connect`, not here.
    pub fn new(descriptor: &SourceDescriptor) -> Self {
        let config = descriptor.effective_config();
        let connect_timeout =
            Duration::from_millis(config.get_u64("connect_timeout_ms").unwrap_or(10_000));

        let identity = match (&descriptor.username, &descriptor.password) {
            (Some(user), Some(pass)) => IdentityToken::UserName(user.clone(), pass.clone()),
            _ => IdentityToken::Anonymous,
        };

        Self {
            source_id: descriptor.id.clone(),
            endpoint: descriptor.endpoint.clone(),
            config,
            identity,
            connect_timeout,
            session: None,
            state: ConnectionState::Disconnected,
            event_loop_handle: None,
        }
    }

    /// Effective config for one call: per-call overrides win over the
    /// source config.
    fn call_config(&self, overrides: Option<&ProtocolConfig>) -> ProtocolConfig {
        match overrides {
            Some(o) => o.merged_over(&self.config),
            None => self.config.clone(),
        }
    }

    fn node_id_for(&self, address: &str, overrides: Option<&ProtocolConfig>) -> NodeId {
        let config = self.call_config(overrides);
        let ns = config.get_u16("namespace_index").unwrap_or(2);
        parse_node_id(address, ns)
    }

    /// Single lazy reconnect before a read/write on a session known to be
    /// dropped.
    async fn ensure_connected(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect().await
    }

    fn session(&self) -> Result<&Arc<Session>> {
        self.session.as_ref().ok_or(GatewayError::NotConnected)
    }

    /// A failed service call means the session is gone; report the fault
    /// and let the next call reconnect lazily.
    fn session_fault(&mut self, context: &str, status: StatusCode) -> GatewayError {
        self.state = ConnectionState::Disconnected;
        warn!(
            source_id = %self.source_id,
            status = %status,
            "OPC UA {} failed, session marked disconnected",
            context
        );
        GatewayError::Protocol(format!("{} failed: {}", context, status))
    }
}

#[async_trait::async_trait]
impl DataClient for OpcUaClient {
    fn protocol(&self) -> Protocol {
        Protocol::OpcUa
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;

        let security_mode = self.config.get_str("security_mode").unwrap_or("NONE");
        if !security_mode.eq_ignore_ascii_case("none") {
            // Only the unsecured channel is wired; signing/encryption would
            // need certificate provisioning.
            warn!(
                source_id = %self.source_id,
                security_mode,
                "requested security mode not supported, using NONE"
            );
        }

        let mut builder = ClientBuilder::new()
            .application_name(APPLICATION_NAME)
            .application_uri(APPLICATION_URI)
            .session_retry_limit(3)
            .create_sample_keypair(true);

        if self.config.get_bool("trust_server_certs").unwrap_or(true) {
            builder = builder.trust_server_certs(true);
        }

        let mut client = builder.client().map_err(|e| {
            self.state = ConnectionState::Disconnected;
            GatewayError::Config(e.join(", "))
        })?;

        let endpoint = (
            self.endpoint.as_str(),
            SecurityPolicy::None.to_uri(),
            MessageSecurityMode::None,
            UserTokenPolicy::anonymous(),
        );

        let connected = tokio::time::timeout(
            self.connect_timeout,
            client.connect_to_matching_endpoint(endpoint, self.identity.clone()),
        )
        .await
        .map_err(|_| {
            self.state = ConnectionState::Disconnected;
            error!(
                source_id = %self.source_id,
                endpoint = %self.endpoint,
                "OPC UA connect timed out"
            );
            GatewayError::Connection(format!(
                "connect to {} timed out after {:?}",
                self.endpoint, self.connect_timeout
            ))
        })?;

        let (session, event_loop) = connected.map_err(|e| {
            self.state = ConnectionState::Disconnected;
            error!(
                source_id = %self.source_id,
                endpoint = %self.endpoint,
                error = %e,
                "OPC UA connect failed"
            );
            GatewayError::Connection(e.to_string())
        })?;

        // The event loop drives the session until disconnect.
        self.event_loop_handle = Some(event_loop.spawn());
        session.wait_for_connection().await;

        self.session = Some(session);
        self.state = ConnectionState::Connected;
        info!(
            source_id = %self.source_id,
            endpoint = %self.endpoint,
            "OPC UA session established"
        );
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.disconnect().await;
            info!(source_id = %self.source_id, "OPC UA session closed");
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        self.state = ConnectionState::Disconnected;
    }

    async fn read(
        &mut self,
        address: &str,
        overrides: Option<&ProtocolConfig>,
    ) -> Result<ReadOutcome> {
        self.ensure_connected().await?;

        let node_id = self.node_id_for(address, overrides);
        let to_read = ReadValueId {
            node_id,
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            data_encoding: QualifiedName::null(),
        };

        let session = self.session()?.clone();
        let results: Vec<DataValue> = match session
            .read(&[to_read], TimestampsToReturn::Both, 0.0)
            .await
        {
            Ok(results) => results,
            Err(status) => return Err(self.session_fault("read", status)),
        };

        let data_value = results
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Protocol("read returned no result".into()))?;

        if let Some(status) = data_value.status {
            if status.is_bad() {
                warn!(
                    source_id = %self.source_id,
                    address,
                    status = %status,
                    "OPC UA read returned bad status"
                );
                return Err(GatewayError::Protocol(format!(
                    "read of {} failed: {}",
                    address, status
                )));
            }
        }

        let value = data_value
            .value
            .as_ref()
            .map(variant_to_value)
            .unwrap_or_default();
        Ok(ReadOutcome::Value(value))
    }

    async fn write(
        &mut self,
        address: &str,
        value: Value,
        overrides: Option<&ProtocolConfig>,
    ) -> Result<()> {
        self.ensure_connected().await?;

        let config = self.call_config(overrides);
        let variant = value_to_variant(&value, config.get_str("data_type"))?;
        let node_id = self.node_id_for(address, overrides);

        let write_value = WriteValue {
            node_id,
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            value: DataValue::new_now(variant),
        };

        let session = self.session()?.clone();
        let statuses = match session.write(&[write_value]).await {
            Ok(statuses) => statuses,
            Err(status) => return Err(self.session_fault("write", status)),
        };

        if let Some(status) = statuses.first() {
            if status.is_bad() {
                warn!(
                    source_id = %self.source_id,
                    address,
                    status = %status,
                    "OPC UA write rejected"
                );
                return Err(GatewayError::Protocol(format!(
                    "write to {} failed: {}",
                    address, status
                )));
            }
        }

        info!(source_id = %self.source_id, address, "OPC UA write ok");
        Ok(())
    }

    async fn subscribe(
        &mut self,
        address: &str,
        _overrides: Option<&ProtocolConfig>,
    ) -> Result<PushReceiver> {
        warn!(
            source_id = %self.source_id,
            address,
            "OPC UA subscriptions not wired for this adapter"
        );
        Err(GatewayError::unsupported(PROTOCOL_NAME, "subscribe"))
    }

    async fn unsubscribe(&mut self, _address: &str) -> Result<()> {
        Err(GatewayError::unsupported(PROTOCOL_NAME, "unsubscribe"))
    }
}
