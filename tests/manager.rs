//! End-to-end manager tests against a loopback WebSocket server.
//!
//! The server side is a plain `tokio_tungstenite::accept_async` loop that
//! records every inbound request frame and can push arbitrary text frames
//! back, which is enough to exercise the full path: manager -> adapter ->
//! socket -> receive loop -> dispatcher -> forwarding task -> handler.

#![cfg(feature = "websocket")]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use daqgw::{
    DataManager, InboundMessage, Protocol, PushHandler, ReadOutcome, SourceDescriptor, Value,
};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

/// Loopback server handle.
struct TestServer {
    /// `ws://...` endpoint to dial.
    url: String,
    /// Request frames received from the client, parsed as JSON.
    requests: mpsc::UnboundedReceiver<serde_json::Value>,
    /// Raw text frames to push down to the client.
    push: mpsc::UnboundedSender<String>,
}

/// Start a one-client loopback server. With `auto_reply` set, every
/// `read` or `subscribe` request frame is answered with a push frame for
/// the same address carrying `42.5`.
async fn spawn_server(auto_reply: bool) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (push_tx, push_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let mut push_rx = Some(push_rx);
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            let (mut sink, mut source) = ws.split();
            let req_tx = req_tx.clone();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

            // External pushes go to the first connection.
            if let Some(mut external) = push_rx.take() {
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    while let Some(text) = external.recv().await {
                        if out_tx.send(text).is_err() {
                            break;
                        }
                    }
                });
            }

            tokio::spawn(async move {
                while let Some(text) = out_rx.recv().await {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            tokio::spawn(async move {
                while let Some(Ok(message)) = source.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let Ok(frame) = serde_json::from_str::<serde_json::Value>(&text) else {
                        continue;
                    };
                    if auto_reply {
                        if let (Some(action), Some(address)) =
                            (frame["action"].as_str(), frame["address"].as_str())
                        {
                            if action == "read" || action == "subscribe" {
                                let reply = serde_json::json!({
                                    "address": address,
                                    "value": 42.5,
                                    "timestamp": "2024-06-01T12:00:00Z",
                                });
                                let _ = out_tx.send(reply.to_string());
                            }
                        }
                    }
                    let _ = req_tx.send(frame);
                }
            });
        }
    });

    TestServer {
        url,
        requests: req_rx,
        push: push_tx,
    }
}

/// Handler that forwards every delivery into an mpsc channel.
struct Recorder {
    tx: mpsc::UnboundedSender<(String, InboundMessage)>,
}

#[async_trait]
impl PushHandler for Recorder {
    async fn on_push(&self, source_id: &str, message: InboundMessage) {
        let _ = self.tx.send((source_id.to_string(), message));
    }
}

fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<(String, InboundMessage)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Recorder { tx }), rx)
}

fn ws_descriptor(id: &str, url: &str) -> SourceDescriptor {
    SourceDescriptor::new(id, Protocol::WebSocket, url)
}

#[tokio::test]
async fn test_add_connect_and_remove() {
    let server = spawn_server(false).await;
    let manager = DataManager::new();

    assert!(manager.add_server(&ws_descriptor("ws1", &server.url)).await);

    let status = manager.get_status("ws1").await.unwrap();
    assert_eq!(status.protocol, Protocol::WebSocket);
    assert!(status.connected);

    manager.remove_server("ws1").await;
    let err = manager.get_status("ws1").await.unwrap_err();
    assert_eq!(err.status(), "source_not_found");
}

#[tokio::test]
async fn test_add_unreachable_endpoint_keeps_entry() {
    let manager = DataManager::new();

    // Nothing listens on port 9; connect fails but the entry survives.
    assert!(!manager.add_server(&ws_descriptor("dead", "ws://127.0.0.1:9")).await);
    assert!(manager.contains("dead"));

    let status = manager.get_status("dead").await.unwrap();
    assert!(!status.connected);
}

#[tokio::test]
async fn test_read_sends_frame_and_push_comes_back() {
    let mut server = spawn_server(true).await;
    let manager = DataManager::new();
    manager.add_server(&ws_descriptor("ws1", &server.url)).await;

    let (handler, mut deliveries) = recorder();
    manager
        .subscribe("ws1", "sensor/flow", handler, None)
        .await
        .unwrap();

    // Consume the subscribe request frame and its auto-reply delivery.
    let frame = timeout(WAIT, server.requests.recv()).await.unwrap().unwrap();
    assert_eq!(frame["action"], "subscribe");
    timeout(WAIT, deliveries.recv()).await.unwrap().unwrap();

    // A read returns immediately; the answer arrives as a push.
    let outcome = manager.read("ws1", "sensor/flow", None).await.unwrap();
    assert!(matches!(outcome, ReadOutcome::Requested));

    let frame = timeout(WAIT, server.requests.recv()).await.unwrap().unwrap();
    assert_eq!(frame["action"], "read");
    assert_eq!(frame["address"], "sensor/flow");
    assert!(frame["timestamp"].is_string());
    assert!(frame.get("value").is_none());

    let (source_id, message) = timeout(WAIT, deliveries.recv()).await.unwrap().unwrap();
    assert_eq!(source_id, "ws1");
    assert_eq!(message.address, "sensor/flow");
    assert_eq!(message.value.as_f64(), Some(42.5));
}

#[tokio::test]
async fn test_write_sends_value_frame() {
    let mut server = spawn_server(false).await;
    let manager = DataManager::new();
    manager.add_server(&ws_descriptor("ws1", &server.url)).await;

    manager
        .write("ws1", "pump/enable", Value::Bool(true), None)
        .await
        .unwrap();

    let frame = timeout(WAIT, server.requests.recv()).await.unwrap().unwrap();
    assert_eq!(frame["action"], "write");
    assert_eq!(frame["address"], "pump/enable");
    assert_eq!(frame["value"], true);
    assert!(frame["timestamp"].is_string());
}

#[tokio::test]
async fn test_push_delivery_fields_and_key_aliases() {
    let mut server = spawn_server(false).await;
    let manager = DataManager::new();
    manager.add_server(&ws_descriptor("ws1", &server.url)).await;

    let (handler, mut deliveries) = recorder();
    manager.subscribe("ws1", "tank/level", handler, None).await.unwrap();
    timeout(WAIT, server.requests.recv()).await.unwrap().unwrap();

    server
        .push
        .send(r#"{"address":"tank/level","value":73.2,"timestamp":"2024-06-01T12:00:00Z"}"#.into())
        .unwrap();
    let (_, message) = timeout(WAIT, deliveries.recv()).await.unwrap().unwrap();
    assert_eq!(message.address, "tank/level");
    assert_eq!(message.value.as_f64(), Some(73.2));
    assert_eq!(message.timestamp.to_rfc3339(), "2024-06-01T12:00:00+00:00");

    // `topic` and `variable` are accepted as address keys as well.
    server
        .push
        .send(r#"{"topic":"tank/level","value":1}"#.into())
        .unwrap();
    let (_, message) = timeout(WAIT, deliveries.recv()).await.unwrap().unwrap();
    assert_eq!(message.value.as_i64(), Some(1));

    server
        .push
        .send(r#"{"variable":"tank/level","value":"open"}"#.into())
        .unwrap();
    let (_, message) = timeout(WAIT, deliveries.recv()).await.unwrap().unwrap();
    assert_eq!(message.value.as_str(), Some("open"));

    // Malformed frames are dropped without killing the stream.
    server.push.send("not json at all".into()).unwrap();
    server
        .push
        .send(r#"{"address":"tank/level","value":2}"#.into())
        .unwrap();
    let (_, message) = timeout(WAIT, deliveries.recv()).await.unwrap().unwrap();
    assert_eq!(message.value.as_i64(), Some(2));
}

#[tokio::test]
async fn test_subscribing_twice_delivers_twice_but_lists_once() {
    let mut server = spawn_server(false).await;
    let manager = DataManager::new();
    manager.add_server(&ws_descriptor("ws1", &server.url)).await;

    let (handler, mut deliveries) = recorder();
    manager
        .subscribe("ws1", "motor/rpm", handler.clone(), None)
        .await
        .unwrap();
    manager
        .subscribe("ws1", "motor/rpm", handler, None)
        .await
        .unwrap();
    timeout(WAIT, server.requests.recv()).await.unwrap().unwrap();
    timeout(WAIT, server.requests.recv()).await.unwrap().unwrap();

    server
        .push
        .send(r#"{"address":"motor/rpm","value":1500}"#.into())
        .unwrap();

    // Two registrations, two deliveries for the one push.
    timeout(WAIT, deliveries.recv()).await.unwrap().unwrap();
    timeout(WAIT, deliveries.recv()).await.unwrap().unwrap();
    assert!(timeout(QUIET, deliveries.recv()).await.is_err());

    // The status snapshot deduplicates the address.
    let status = manager.get_status("ws1").await.unwrap();
    assert_eq!(status.subscriptions, vec!["motor/rpm".to_string()]);
}

#[tokio::test]
async fn test_no_delivery_after_remove() {
    let mut server = spawn_server(false).await;
    let manager = DataManager::new();
    manager.add_server(&ws_descriptor("ws1", &server.url)).await;

    let (handler, mut deliveries) = recorder();
    manager.subscribe("ws1", "valve/state", handler, None).await.unwrap();
    timeout(WAIT, server.requests.recv()).await.unwrap().unwrap();

    server
        .push
        .send(r#"{"address":"valve/state","value":true}"#.into())
        .unwrap();
    timeout(WAIT, deliveries.recv()).await.unwrap().unwrap();

    manager.remove_server("ws1").await;

    // The socket is closed and the forwarding tasks are gone; a late push
    // attempt reaches nobody. With the last handler reference dropped the
    // delivery channel closes with nothing buffered.
    let _ = server
        .push
        .send(r#"{"address":"valve/state","value":false}"#.into());
    let late = timeout(WAIT, deliveries.recv()).await.unwrap();
    assert!(late.is_none());
}

#[tokio::test]
async fn test_mixed_fleet_statuses() {
    let server = spawn_server(false).await;
    let manager = DataManager::new();

    manager.add_server(&ws_descriptor("ws1", &server.url)).await;
    manager
        .add_server(&SourceDescriptor::new(
            "legacy1",
            Protocol::OpcClassic,
            "opcda://localhost",
        ))
        .await;

    let mut statuses = manager.get_all_statuses().await;
    statuses.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].protocol, Protocol::OpcClassic);
    assert_eq!(statuses[1].protocol, Protocol::WebSocket);
    assert!(statuses.iter().all(|s| s.connected));
}
