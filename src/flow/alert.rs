use super::{FieldValue, FlowRecord};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Triage lifecycle. Only `New` is ever written by the stream; the rest are
/// driven externally through the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AlertStatus::New),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Raw counters copied from the originating flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFeatures {
    pub bytes: Option<FieldValue>,
    pub packets: Option<FieldValue>,
    pub duration: Option<FieldValue>,
}

/// A flow the model flagged as anomalous. Has its own identity: redelivery of the
/// same flow produces a second alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: Option<String>,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub protocol: Option<String>,
    pub score: f64,
    pub model: String,
    pub features: AlertFeatures,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn from_flow(flow: &FlowRecord, score: f64, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: flow.timestamp.as_ref().map(FieldValue::render),
            src_ip: flow.src_ip.as_ref().map(FieldValue::render),
            dst_ip: flow.dst_ip.as_ref().map(FieldValue::render),
            protocol: flow.protocol.as_ref().map(FieldValue::render),
            score,
            model: model.into(),
            features: AlertFeatures {
                bytes: flow.bytes.clone(),
                packets: flow.packets.clone(),
                duration: flow.duration.clone(),
            },
            status: AlertStatus::New,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_restricted() {
        assert_eq!("acknowledged".parse::<AlertStatus>().unwrap(), AlertStatus::Acknowledged);
        assert!(matches!(
            "closed".parse::<AlertStatus>(),
            Err(StoreError::InvalidStatus(s)) if s == "closed"
        ));
    }

    #[test]
    fn alert_copies_flow_identity_and_counters() {
        let flow = FlowRecord {
            src_ip: Some("10.10.0.25".into()),
            protocol: Some("UDP".into()),
            bytes: Some(FieldValue::Int(900_000)),
            ..FlowRecord::default()
        };
        let alert = Alert::from_flow(&flow, 0.21, "isolation_forest");
        assert_eq!(alert.status, AlertStatus::New);
        assert_eq!(alert.features.bytes, Some(FieldValue::Int(900_000)));
        let doc = serde_json::to_value(&alert).unwrap();
        assert_eq!(doc["status"], "new");
        assert_eq!(doc["model"], "isolation_forest");
    }
}
