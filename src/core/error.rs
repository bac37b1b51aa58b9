//! Error types for the data acquisition gateway.
//!
//! Adapters absorb every transport-level fault and convert it into a
//! `GatewayError` plus a log entry; no adapter-internal panic crosses into
//! the manager. The manager likewise only ever returns structured outcomes.
//! The external API layer renders these; `GatewayError::status()` gives it
//! a stable machine-readable tag to pair with the `Display` message.

use thiserror::Error;

/// Result type used throughout the gateway.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error taxonomy.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Unknown source id passed to a manager operation.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// Protocol tag absent from the factory (or registered but not implemented).
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Contract method not meaningfully implemented by an adapter.
    #[error("operation '{operation}' is not supported by the {protocol} adapter")]
    UnsupportedOperation {
        /// Protocol name of the adapter.
        protocol: &'static str,
        /// Name of the unsupported operation.
        operation: &'static str,
    },

    /// Value cannot be coerced to the point's declared data type.
    #[error("type conversion failed: {0}")]
    TypeConversion(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Protocol-level fault on an established transport.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation requires a connection that is not established.
    #[error("not connected")]
    NotConnected,
}

impl GatewayError {
    /// Shorthand for an unsupported-operation error.
    pub const fn unsupported(protocol: &'static str, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            protocol,
            operation,
        }
    }

    /// Stable status tag for the external API layer.
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_failure",
            Self::SourceNotFound(_) => "source_not_found",
            Self::UnsupportedProtocol(_) => "unsupported_protocol",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::TypeConversion(_) => "type_conversion_failure",
            Self::Config(_) => "config_error",
            Self::Protocol(_) => "protocol_error",
            Self::NotConnected => "not_connected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_tags() {
        assert_eq!(
            GatewayError::Connection("refused".into()).status(),
            "connection_failure"
        );
        assert_eq!(
            GatewayError::SourceNotFound("plc1".into()).status(),
            "source_not_found"
        );
        assert_eq!(
            GatewayError::unsupported("OPC Classic", "read").status(),
            "unsupported_operation"
        );
    }

    #[test]
    fn test_unsupported_operation_message() {
        let err = GatewayError::unsupported("OPC Classic", "write");
        assert_eq!(
            err.to_string(),
            "operation 'write' is not supported by the OPC Classic adapter"
        );
    }
}
