//! Flow telemetry records as received from the event source, and the alerts derived from them.

mod alert;
mod synthetic;

pub use alert::{Alert, AlertFeatures, AlertStatus};
pub use synthetic::FlowGenerator;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A loosely typed field value. Producers are not trusted to send numbers where
/// numbers are expected, so coercion happens at extraction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value; `None` when text does not parse as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Borrowed text, `None` for numbers and booleans.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Raw rendering, used in error messages and indexed columns.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// One summarized network conversation. Persisted verbatim; envelope fields the
/// transport may add are dropped on deserialization. Identity fields keep
/// whatever scalar type arrived, e.g. a numeric protocol or an epoch timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    #[serde(default)]
    pub timestamp: Option<FieldValue>,
    #[serde(default)]
    pub src_ip: Option<FieldValue>,
    #[serde(default)]
    pub dst_ip: Option<FieldValue>,
    #[serde(default)]
    pub protocol: Option<FieldValue>,
    #[serde(default)]
    pub bytes: Option<FieldValue>,
    #[serde(default)]
    pub packets: Option<FieldValue>,
    #[serde(default)]
    pub duration: Option<FieldValue>,
    #[serde(default)]
    pub src_port: Option<FieldValue>,
    #[serde(default)]
    pub dst_port: Option<FieldValue>,
}

impl FlowRecord {
    /// Decode one inbound event payload.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn src_ip(&self) -> Cow<'_, str> {
        text(self.src_ip.as_ref())
    }

    pub fn dst_ip(&self) -> Cow<'_, str> {
        text(self.dst_ip.as_ref())
    }

    /// Protocol name; numeric protocol numbers are not names and give `None`.
    pub fn protocol_name(&self) -> Option<&str> {
        self.protocol.as_ref().and_then(FieldValue::as_str)
    }
}

fn text(value: Option<&FieldValue>) -> Cow<'_, str> {
    match value {
        Some(FieldValue::Text(s)) => Cow::Borrowed(s),
        Some(other) => Cow::Owned(other.render()),
        None => Cow::Borrowed(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_event_and_drops_envelope_fields() {
        let payload = r#"{"timestamp":"2025-11-01T12:00:00Z","src_ip":"10.10.0.25","dst_ip":"10.20.0.10",
            "protocol":"TCP","bytes":2048,"packets":15,"duration":2.3,"src_port":54321,"dst_port":80,
            "partition":3,"offset":991}"#;
        let flow = FlowRecord::from_json(payload).unwrap();
        assert_eq!(flow.bytes, Some(FieldValue::Int(2048)));
        assert_eq!(flow.duration, Some(FieldValue::Float(2.3)));
        let stored = serde_json::to_value(&flow).unwrap();
        assert!(stored.get("partition").is_none());
        assert_eq!(stored["bytes"], serde_json::json!(2048));
    }

    #[test]
    fn keeps_non_numeric_values_verbatim() {
        let flow = FlowRecord::from_json(r#"{"bytes":"not-a-number","packets":"12"}"#).unwrap();
        assert_eq!(flow.bytes, Some(FieldValue::Text("not-a-number".into())));
        assert_eq!(flow.bytes.as_ref().and_then(FieldValue::as_f64), None);
        assert_eq!(flow.packets.as_ref().and_then(FieldValue::as_f64), Some(12.0));
        assert!(flow.src_port.is_none());
    }

    #[test]
    fn identity_fields_accept_any_scalar() {
        let flow =
            FlowRecord::from_json(r#"{"timestamp":1761998400,"src_ip":"10.0.0.1","protocol":6}"#).unwrap();
        assert_eq!(flow.protocol, Some(FieldValue::Int(6)));
        assert_eq!(flow.protocol_name(), None);
        assert_eq!(flow.timestamp.as_ref().map(FieldValue::render).as_deref(), Some("1761998400"));
        assert_eq!(flow.src_ip(), "10.0.0.1");
        assert_eq!(flow.dst_ip(), "");
        let stored = serde_json::to_value(&flow).unwrap();
        assert_eq!(stored["protocol"], serde_json::json!(6));
    }
}
