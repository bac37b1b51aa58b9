//! The client contract every protocol adapter implements.
//!
//! ```text
//! DataClient          // connect, disconnect, read, write, subscribe
//!   ├── OpcUaClient       session-oriented, synchronous read/write
//!   ├── WebSocketClient   duplex socket, background receive loop, push
//!   └── OpcClassicClient  stub: full contract, unsupported operations
//! ```
//!
//! Push delivery is channel-based: `subscribe` hands back a broadcast
//! receiver of [`InboundMessage`] rather than holding raw function
//! pointers, which makes lifetime and cancellation around `disconnect`
//! unambiguous. The manager layers callback-style handlers on top.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::config::ProtocolConfig;
use crate::core::data::{InboundMessage, Value};
use crate::core::error::Result;
use crate::core::metadata::Protocol;

/// Connection state of an adapter.
///
/// There is no separate error state: a failed connect or a detected
/// transport closure lands back in `Disconnected`, and the error itself is
/// reported at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected to the source.
    #[default]
    Disconnected,

    /// Attempting to connect.
    Connecting,

    /// Connected and operational.
    Connected,
}

impl ConnectionState {
    /// Check if currently connected.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a successful `read` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The protocol answered synchronously with a value.
    Value(Value),

    /// The request frame was sent; the value, if any, arrives later
    /// through the push path keyed by address alone. There is no
    /// request-id correlation, so concurrent reads on the same address
    /// are indistinguishable.
    Requested,
}

impl ReadOutcome {
    /// The synchronous value, if the protocol produced one.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Requested => None,
        }
    }
}

/// Receiver side of a per-address push subscription.
pub type PushReceiver = broadcast::Receiver<InboundMessage>;

/// Sender side of a per-address push subscription.
pub type PushSender = broadcast::Sender<InboundMessage>;

/// The capability set every adapter must implement.
///
/// Error discipline: adapters absorb transport faults into `GatewayError`
/// results (plus a log entry carrying the source context); nothing panics
/// across this boundary. `read` and `write` attempt a single lazy
/// reconnect when the adapter knows it is disconnected, then fail.
#[async_trait]
pub trait DataClient: Send + Sync {
    /// The protocol tag this adapter implements.
    fn protocol(&self) -> Protocol;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Check if the transport is currently believed open.
    fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Connect to the source. Idempotent; connecting while connected is a
    /// no-op success.
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect. Safe to call repeatedly; releases the transport and
    /// cancels any background receive activity before returning. No push
    /// delivery occurs from this adapter after the call returns.
    async fn disconnect(&mut self);

    /// Read a single addressable point.
    ///
    /// `overrides` is a per-call config merged over the source-level
    /// config inside the adapter.
    async fn read(&mut self, address: &str, overrides: Option<&ProtocolConfig>)
        -> Result<ReadOutcome>;

    /// Write a single addressable point.
    async fn write(
        &mut self,
        address: &str,
        value: Value,
        overrides: Option<&ProtocolConfig>,
    ) -> Result<()>;

    /// Register interest in push updates for `address`.
    ///
    /// Returns a receiver that yields every [`InboundMessage`] routed to
    /// that address. Adapters without a push transport return
    /// `GatewayError::UnsupportedOperation`.
    async fn subscribe(
        &mut self,
        address: &str,
        overrides: Option<&ProtocolConfig>,
    ) -> Result<PushReceiver>;

    /// Drop the push registration for `address`.
    ///
    /// Exposed at the adapter level only; the manager discards
    /// subscriptions wholesale when a source is removed.
    async fn unsubscribe(&mut self, address: &str) -> Result<()>;
}

/// Callback-style consumer of push updates, registered through the manager.
///
/// The external persistence collaborator implements this to record each
/// delivered `(address, value, timestamp, quality)` as a reading.
#[async_trait]
pub trait PushHandler: Send + Sync {
    /// Handle one delivered push message.
    async fn on_push(&self, source_id: &str, message: InboundMessage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_read_outcome_value() {
        let out = ReadOutcome::Value(Value::Float(1.5));
        assert_eq!(out.value(), Some(&Value::Float(1.5)));
        assert_eq!(ReadOutcome::Requested.value(), None);
    }
}
