//! Data types for the acquisition gateway.
//!
//! This module defines the protocol-agnostic value representation and the
//! unit of push delivery. The gateway does not know what the application
//! layer does with a value; it only guarantees the shape delivered here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::quality::Quality;

/// A protocol-agnostic value representation.
///
/// This enum provides a unified way to represent values from different
/// protocols. Wire formats that carry JSON map onto it losslessly for the
/// scalar types the gateway deals in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Floating-point number (most common for analog values)
    Float(f64),

    /// Integer value
    Integer(i64),

    /// Boolean value (common for digital I/O)
    Bool(bool),

    /// String value
    String(String),

    /// Null/missing value
    #[default]
    Null,
}

impl Value {
    /// Try to get the value as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Try to get the value as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Float(v) => Some(*v as i64),
            Self::Bool(v) => Some(if *v { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Try to get the value as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Integer(v) => Some(*v != 0),
            Self::Float(v) => Some(*v != 0.0),
            _ => None,
        }
    }

    /// Try to get the value as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert a JSON value into a gateway value.
    ///
    /// Arrays and objects have no scalar equivalent; they are carried as
    /// their compact JSON text so nothing is silently dropped.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }

    /// Convert into a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Float(v) => serde_json::json!(v),
            Self::Integer(v) => serde_json::json!(v),
            Self::Bool(v) => serde_json::json!(v),
            Self::String(s) => serde_json::json!(s),
            Self::Null => serde_json::Value::Null,
        }
    }
}

// Convenient From implementations
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// The unit delivered to push subscribers.
///
/// Inbound push frames from a duplex-socket source decode into this shape;
/// downstream, the persistence collaborator records it as a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Address the value belongs to (node id, topic, variable name).
    pub address: String,

    /// The delivered value.
    pub value: Value,

    /// When the value was produced (source timestamp if the frame carried
    /// one, otherwise gateway receive time).
    pub timestamp: DateTime<Utc>,

    /// Confidence tag attached to the value.
    #[serde(default)]
    pub quality: Quality,
}

impl InboundMessage {
    /// Create a message stamped with the current time and good quality.
    pub fn new(address: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            address: address.into(),
            value: value.into(),
            timestamp: Utc::now(),
            quality: Quality::Good,
        }
    }

    /// Set the quality.
    #[must_use]
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        let v = Value::from(42.5);
        assert_eq!(v.as_f64(), Some(42.5));
        assert_eq!(v.as_i64(), Some(42));

        let v = Value::from(true);
        assert_eq!(v.as_bool(), Some(true));
        assert_eq!(v.as_f64(), Some(1.0));

        let v = Value::from("hello");
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_f64(), None);
    }

    #[test]
    fn test_value_json_roundtrip() {
        let cases = [
            (serde_json::json!(25.5), Value::Float(25.5)),
            (serde_json::json!(7), Value::Integer(7)),
            (serde_json::json!(true), Value::Bool(true)),
            (serde_json::json!("on"), Value::String("on".into())),
            (serde_json::Value::Null, Value::Null),
        ];
        for (json, expected) in cases {
            let v = Value::from_json(&json);
            assert_eq!(v, expected);
            assert_eq!(v.to_json(), json);
        }
    }

    #[test]
    fn test_value_from_json_object() {
        let v = Value::from_json(&serde_json::json!({"a": 1}));
        assert_eq!(v, Value::String("{\"a\":1}".into()));
    }

    #[test]
    fn test_inbound_message() {
        let msg = InboundMessage::new("ns=2;s=Temperature", 25.5);
        assert_eq!(msg.address, "ns=2;s=Temperature");
        assert_eq!(msg.value.as_f64(), Some(25.5));
        assert_eq!(msg.quality, Quality::Good);

        let msg = msg.with_quality(Quality::Uncertain);
        assert_eq!(msg.quality, Quality::Uncertain);
    }
}
