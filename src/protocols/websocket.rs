//! Duplex-socket protocol adapter over WebSocket.
//!
//! One persistent bidirectional connection per source. `read` and `write`
//! only *send* a request frame; the adapter never blocks waiting for a
//! reply. Values arrive independently as push frames through a background
//! receive loop and are routed to subscribers by address alone - the wire
//! protocol carries no request identifier, so concurrent reads on the same
//! address cannot be told apart. Callers must not assume a `read` call's
//! eventual value answers that specific call.
//!
//! # Wire contract
//!
//! Outbound request frame:
//! `{"action": "read"|"write"|"subscribe"|"unsubscribe", "address": string,
//!   "value"?: any, "timestamp": ISO-8601}`
//!
//! Inbound push frame: `{"address"|"topic"|"variable": string, "value": any,
//! "timestamp"?: ISO-8601, "quality"?: "GOOD"|"BAD"|"UNCERTAIN"}`.
//! Malformed frames are logged and dropped without disturbing the loop.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::core::config::{ProtocolConfig, SourceDescriptor};
use crate::core::data::{InboundMessage, Value};
use crate::core::error::{GatewayError, Result};
use crate::core::metadata::Protocol;
use crate::core::quality::Quality;
use crate::core::traits::{ConnectionState, DataClient, PushReceiver, PushSender, ReadOutcome};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Outbound request frame.
#[derive(Debug, Serialize)]
struct RequestFrame<'a> {
    action: &'static str,
    address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    timestamp: String,
}

impl<'a> RequestFrame<'a> {
    fn new(action: &'static str, address: &'a str, value: Option<&Value>) -> Self {
        Self {
            action,
            address,
            value: value.map(Value::to_json),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Routes decoded push frames to per-address subscription channels.
///
/// Shared between the adapter (which registers subscriptions) and the
/// background receive loop (which dispatches). Dropping a route's sender
/// closes every receiver handed out for that address.
pub(crate) struct PushDispatcher {
    routes: DashMap<String, PushSender>,
    buffer_size: usize,
}

impl PushDispatcher {
    fn new(buffer_size: usize) -> Self {
        Self {
            routes: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Get or create the channel for `address` and return a new receiver.
    fn subscribe(&self, address: &str) -> PushReceiver {
        self.routes
            .entry(address.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe()
    }

    /// Drop the channel for `address`, closing its receivers.
    fn unsubscribe(&self, address: &str) -> bool {
        self.routes.remove(address).is_some()
    }

    /// Route one message; returns the number of receivers reached.
    fn dispatch(&self, message: InboundMessage) -> usize {
        match self.routes.get(&message.address) {
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop every route, closing all receivers.
    fn clear(&self) {
        self.routes.clear();
    }
}

/// Decode an inbound push frame.
///
/// Accepts `address`, `topic` or `variable` as the address key. A missing
/// timestamp defaults to the gateway receive time; a missing quality
/// defaults to GOOD.
fn decode_frame(text: &str) -> Option<InboundMessage> {
    let json: serde_json::Value = serde_json::from_str(text).ok()?;
    let obj = json.as_object()?;

    let address = obj
        .get("address")
        .or_else(|| obj.get("topic"))
        .or_else(|| obj.get("variable"))?
        .as_str()?
        .to_string();

    let value = obj.get("value").map(Value::from_json).unwrap_or_default();

    let timestamp = obj
        .get("timestamp")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let quality: Quality = obj
        .get("quality")
        .and_then(|q| serde_json::from_value(q.clone()).ok())
        .unwrap_or_default();

    Some(InboundMessage {
        address,
        value,
        timestamp,
        quality,
    })
}

/// Duplex-socket adapter.
pub struct WebSocketClient {
    source_id: String,
    endpoint: String,
    connect_timeout: Duration,
    /// Shared with the receive loop so a detected closure flips it.
    state: Arc<RwLock<ConnectionState>>,
    dispatcher: Arc<PushDispatcher>,
    sink: Option<WsSink>,
    recv_task: Option<JoinHandle<()>>,
}

impl WebSocketClient {
    /// Create an adapter from a source descriptor. The transport is opened
    /// by `connect`, not here.
    pub fn new(descriptor: &SourceDescriptor) -> Self {
        let config = descriptor.effective_config();
        let connect_timeout = Duration::from_millis(config.get_u64("connect_timeout_ms").unwrap_or(10_000));
        let buffer_size = config.get_u64("buffer_size").unwrap_or(256) as usize;

        Self {
            source_id: descriptor.id.clone(),
            endpoint: descriptor.endpoint.clone(),
            connect_timeout,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            dispatcher: Arc::new(PushDispatcher::new(buffer_size)),
            sink: None,
            recv_task: None,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut s) = self.state.write() {
            *s = state;
        }
    }

    fn get_state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Single lazy reconnect before a read/write/subscribe on a transport
    /// known to be closed.
    async fn ensure_connected(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect().await
    }

    /// Serialize and send one request frame.
    async fn send_frame(&mut self, frame: &RequestFrame<'_>) -> Result<()> {
        let text = serde_json::to_string(frame)
            .map_err(|e| GatewayError::Protocol(format!("frame encoding failed: {}", e)))?;

        let sink = self.sink.as_mut().ok_or(GatewayError::NotConnected)?;
        if let Err(e) = sink.send(Message::Text(text)).await {
            self.set_state(ConnectionState::Disconnected);
            warn!(
                source_id = %self.source_id,
                address = frame.address,
                action = frame.action,
                error = %e,
                "websocket send failed"
            );
            return Err(GatewayError::Connection(e.to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataClient for WebSocketClient {
    fn protocol(&self) -> Protocol {
        Protocol::WebSocket
    }

    fn connection_state(&self) -> ConnectionState {
        self.get_state()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        // A reconnect may find the previous receive loop still draining a
        // broken transport. Stop it and drop the stale sink before opening
        // the new connection, so exactly one loop ever feeds the
        // dispatcher and its exit cannot clobber the fresh state.
        if let Some(task) = self.recv_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.sink = None;

        self.set_state(ConnectionState::Connecting);

        let connected =
            tokio::time::timeout(self.connect_timeout, connect_async(self.endpoint.as_str()))
            .await
            .map_err(|_| {
                self.set_state(ConnectionState::Disconnected);
                error!(
                    source_id = %self.source_id,
                    endpoint = %self.endpoint,
                    "websocket connect timed out"
                );
                GatewayError::Connection(format!(
                    "connect to {} timed out after {:?}",
                    self.endpoint, self.connect_timeout
                ))
            })?;

        let (stream, _response) = connected.map_err(|e| {
            self.set_state(ConnectionState::Disconnected);
            error!(
                source_id = %self.source_id,
                endpoint = %self.endpoint,
                error = %e,
                "websocket connect failed"
            );
            GatewayError::Connection(e.to_string())
        })?;

        let (sink, mut read) = stream.split();
        self.sink = Some(sink);

        // Receive loop: lives until disconnect() aborts it or the peer
        // closes the transport.
        let source_id = self.source_id.clone();
        let state = self.state.clone();
        let dispatcher = self.dispatcher.clone();
        self.recv_task = Some(tokio::spawn(async move {
            while let Some(next) = read.next().await {
                match next {
                    Ok(Message::Text(text)) => match decode_frame(&text) {
                        Some(message) => {
                            let delivered = dispatcher.dispatch(message);
                            debug!(source_id = %source_id, delivered, "push frame dispatched");
                        }
                        None => {
                            warn!(source_id = %source_id, frame = %text, "dropping malformed push frame");
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!(source_id = %source_id, "websocket closed by peer");
                        break;
                    }
                    // Pings are answered by the protocol layer; binary
                    // frames are not part of the contract.
                    Ok(_) => {}
                    Err(e) => {
                        warn!(source_id = %source_id, error = %e, "websocket receive error");
                        break;
                    }
                }
            }
            if let Ok(mut s) = state.write() {
                *s = ConnectionState::Disconnected;
            }
        }));

        self.set_state(ConnectionState::Connected);
        info!(
            source_id = %self.source_id,
            endpoint = %self.endpoint,
            "websocket connected"
        );
        Ok(())
    }

    async fn disconnect(&mut self) {
        // Cancel the receive loop first and wait for it to finish, so no
        // push delivery can happen after this method returns.
        if let Some(task) = self.recv_task.take() {
            task.abort();
            let _ = task.await;
        }

        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }

        // Closes every subscriber's receiver.
        self.dispatcher.clear();

        if self.get_state() != ConnectionState::Disconnected {
            info!(source_id = %self.source_id, "websocket disconnected");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Send a read request frame. The value, if the peer answers at all,
    /// arrives through the push path for this address.
    async fn read(
        &mut self,
        address: &str,
        _overrides: Option<&ProtocolConfig>,
    ) -> Result<ReadOutcome> {
        self.ensure_connected().await?;
        let frame = RequestFrame::new("read", address, None);
        self.send_frame(&frame).await?;
        Ok(ReadOutcome::Requested)
    }

    async fn write(
        &mut self,
        address: &str,
        value: Value,
        _overrides: Option<&ProtocolConfig>,
    ) -> Result<()> {
        self.ensure_connected().await?;
        let frame = RequestFrame::new("write", address, Some(&value));
        self.send_frame(&frame).await?;
        debug!(source_id = %self.source_id, address, "write frame sent");
        Ok(())
    }

    async fn subscribe(
        &mut self,
        address: &str,
        _overrides: Option<&ProtocolConfig>,
    ) -> Result<PushReceiver> {
        self.ensure_connected().await?;
        let receiver = self.dispatcher.subscribe(address);
        let frame = RequestFrame::new("subscribe", address, None);
        self.send_frame(&frame).await?;
        info!(source_id = %self.source_id, address, "subscribed");
        Ok(receiver)
    }

    async fn unsubscribe(&mut self, address: &str) -> Result<()> {
        if self.dispatcher.unsubscribe(address) {
            info!(source_id = %self.source_id, address, "unsubscribed");
        }
        if self.is_connected() {
            let frame = RequestFrame::new("unsubscribe", address, None);
            self.send_frame(&frame).await?;
        }
        Ok(())
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        // The async disconnect path is the real cleanup; this only stops a
        // still-running receive loop if the adapter is dropped connected.
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame_address_key_aliases() {
        for key in ["address", "topic", "variable"] {
            let text = format!("{{\"{}\": \"sensor/1\", \"value\": 20.5}}", key);
            let msg = decode_frame(&text).unwrap();
            assert_eq!(msg.address, "sensor/1");
            assert_eq!(msg.value, Value::Float(20.5));
            assert_eq!(msg.quality, Quality::Good);
        }
    }

    #[test]
    fn test_decode_frame_timestamp_and_quality() {
        let msg = decode_frame(
            r#"{"address": "a", "value": 1, "timestamp": "2024-05-01T12:00:00Z", "quality": "UNCERTAIN"}"#,
        )
        .unwrap();
        assert_eq!(msg.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(msg.quality, Quality::Uncertain);

        // Unparseable timestamp falls back to receive time rather than
        // dropping the frame.
        let msg = decode_frame(r#"{"address": "a", "value": 1, "timestamp": "yesterday"}"#).unwrap();
        assert_eq!(msg.value, Value::Integer(1));
    }

    #[test]
    fn test_decode_frame_malformed() {
        assert!(decode_frame("not json").is_none());
        assert!(decode_frame("[1,2,3]").is_none());
        assert!(decode_frame(r#"{"value": 1}"#).is_none());
        assert!(decode_frame(r#"{"address": 42, "value": 1}"#).is_none());
    }

    #[test]
    fn test_decode_frame_missing_value_is_null() {
        let msg = decode_frame(r#"{"topic": "t"}"#).unwrap();
        assert!(msg.value.is_null());
    }

    #[test]
    fn test_request_frame_serialization() {
        let frame = RequestFrame::new("write", "pump/2", Some(&Value::Bool(true)));
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(json["action"], "write");
        assert_eq!(json["address"], "pump/2");
        assert_eq!(json["value"], true);
        assert!(json["timestamp"].is_string());

        // Read frames omit the value key entirely.
        let frame = RequestFrame::new("read", "pump/2", None);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert!(json.get("value").is_none());
    }

    #[tokio::test]
    async fn test_dispatcher_routes_by_address() {
        let dispatcher = PushDispatcher::new(16);
        let mut rx_a = dispatcher.subscribe("a");
        let mut rx_b = dispatcher.subscribe("b");

        assert_eq!(dispatcher.dispatch(InboundMessage::new("a", 1.0)), 1);
        assert_eq!(dispatcher.dispatch(InboundMessage::new("c", 2.0)), 0);

        let got = rx_a.recv().await.unwrap();
        assert_eq!(got.address, "a");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatcher_duplicate_subscriptions_fan_out() {
        // Re-subscribing the same address yields another receiver on the
        // same channel: every registration sees every push.
        let dispatcher = PushDispatcher::new(16);
        let mut rx1 = dispatcher.subscribe("a");
        let mut rx2 = dispatcher.subscribe("a");

        assert_eq!(dispatcher.dispatch(InboundMessage::new("a", 5.0)), 2);
        assert_eq!(rx1.recv().await.unwrap().value, Value::Float(5.0));
        assert_eq!(rx2.recv().await.unwrap().value, Value::Float(5.0));
    }

    #[tokio::test]
    async fn test_dispatcher_clear_closes_receivers() {
        let dispatcher = PushDispatcher::new(16);
        let mut rx = dispatcher.subscribe("a");
        dispatcher.clear();

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(dispatcher.dispatch(InboundMessage::new("a", 1.0)), 0);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_receive_loop() {
        use std::time::Duration;

        // Hand every accepted connection back to the test.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (conn_tx, mut conn_rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    if conn_tx.send(ws).is_err() {
                        break;
                    }
                }
            }
        });

        let desc = SourceDescriptor::new("ws1", Protocol::WebSocket, url.as_str());
        let mut client = WebSocketClient::new(&desc);
        client.connect().await.unwrap();
        let mut first_conn = conn_rx.recv().await.unwrap();

        let mut rx = client.subscribe("a", None).await.unwrap();

        // Simulate a detected transport fault, then reconnect.
        client.set_state(ConnectionState::Disconnected);
        client.connect().await.unwrap();
        let mut second_conn = conn_rx.recv().await.unwrap();
        assert!(client.is_connected());

        // Only the loop on the fresh connection may dispatch; the loop on
        // the first one must be gone, not racing it.
        let frame = r#"{"address":"a","value":1}"#;
        let _ = first_conn.send(Message::Text(frame.into())).await;
        second_conn.send(Message::Text(frame.into())).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.value, Value::Integer(1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        // The old loop's exit must not have flipped the fresh connection
        // back to disconnected.
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_failure_is_structured() {
        // Nothing listens on this port; connect must fail with a
        // Connection error, not a panic, and leave the state Disconnected.
        let desc = SourceDescriptor::new("ws-dead", Protocol::WebSocket, "ws://127.0.0.1:1/ws")
            .with_config(ProtocolConfig::new().with("connect_timeout_ms", 2_000u64));
        let mut client = WebSocketClient::new(&desc);

        let err = client.connect().await.unwrap_err();
        assert_eq!(err.status(), "connection_failure");
        assert!(!client.is_connected());
    }
}
