//! Pipeline events
//!
//! Wire format: `{"id": .., "type": "check.requested", "timestamp": .., "payload": {..}}`
//! with snake_case payload fields. The `type` tag doubles as the routing key.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use compliance_service::SanctionsResult;
use risk_engine::{RiskLevel, RiskScore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    CheckRequested,
    CheckCompleted,
    CheckFailed,
    ReportReady,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CheckRequested => "check.requested",
            EventType::CheckCompleted => "check.completed",
            EventType::CheckFailed => "check.failed",
            EventType::ReportReady => "report.ready",
        }
    }

    pub fn routing_key(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check.requested" => Ok(EventType::CheckRequested),
            "check.completed" => Ok(EventType::CheckCompleted),
            "check.failed" => Ok(EventType::CheckFailed),
            "report.ready" => Ok(EventType::ReportReady),
            other => Err(EventDecodeError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownType(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRequested {
    pub check_id: Uuid,
    pub address: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckCompleted {
    pub check_id: Uuid,
    pub address: String,
    pub currency: String,
    pub risk_score: RiskScore,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sanctions: SanctionsResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckFailed {
    pub check_id: Uuid,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportReady {
    pub check_id: Uuid,
    pub report_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    CheckRequested(CheckRequested),
    CheckCompleted(CheckCompleted),
    CheckFailed(CheckFailed),
    ReportReady(ReportReady),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::CheckRequested(_) => EventType::CheckRequested,
            EventPayload::CheckCompleted(_) => EventType::CheckCompleted,
            EventPayload::CheckFailed(_) => EventType::CheckFailed,
            EventPayload::ReportReady(_) => EventType::ReportReady,
        }
    }

    pub fn check_id(&self) -> Uuid {
        match self {
            EventPayload::CheckRequested(e) => e.check_id,
            EventPayload::CheckCompleted(e) => e.check_id,
            EventPayload::CheckFailed(e) => e.check_id,
            EventPayload::ReportReady(e) => e.check_id,
        }
    }

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            EventPayload::CheckRequested(e) => serde_json::to_value(e),
            EventPayload::CheckCompleted(e) => serde_json::to_value(e),
            EventPayload::CheckFailed(e) => serde_json::to_value(e),
            EventPayload::ReportReady(e) => serde_json::to_value(e),
        }
    }

    fn from_value(event_type: EventType, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match event_type {
            EventType::CheckRequested => EventPayload::CheckRequested(serde_json::from_value(value)?),
            EventType::CheckCompleted => EventPayload::CheckCompleted(serde_json::from_value(value)?),
            EventType::CheckFailed => EventPayload::CheckFailed(serde_json::from_value(value)?),
            EventType::ReportReady => EventPayload::ReportReady(serde_json::from_value(value)?),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEvent {
    id: Uuid,
    #[serde(rename = "type")]
    event_type: String,
    timestamp: DateTime<Utc>,
    payload: serde_json::Value,
}

/// Event envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        let wire = WireEvent {
            id: self.id,
            event_type: self.event_type().as_str().to_string(),
            timestamp: self.timestamp,
            payload: self.payload.to_value()?,
        };
        Ok(Bytes::from(serde_json::to_vec(&wire)?))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EventDecodeError> {
        let wire: WireEvent = serde_json::from_slice(bytes)?;
        let event_type: EventType = wire.event_type.parse()?;

        Ok(Self {
            id: wire.id,
            timestamp: wire.timestamp,
            payload: EventPayload::from_value(event_type, wire.payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let check_id = Uuid::new_v4();
        let event = Event::new(EventPayload::CheckRequested(CheckRequested {
            check_id,
            address: "0xabc".to_string(),
            currency: "ETH".to_string(),
        }));

        let json: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "check.requested");
        assert_eq!(json["payload"]["check_id"], check_id.to_string());
        assert_eq!(json["payload"]["currency"], "ETH");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_decode_completed_from_external_producer() {
        let check_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "id": Uuid::new_v4(),
            "type": "check.completed",
            "timestamp": "2026-01-01T00:00:00Z",
            "payload": {
                "check_id": check_id,
                "address": "0xabc",
                "currency": "ETH",
                "risk_score": 85,
                "risk_level": "Critical",
                "categories": ["Mixer"],
                "sanctions": { "hit": false, "identifications": [] }
            }
        });

        let event = Event::decode(raw.to_string().as_bytes()).unwrap();
        assert_eq!(event.event_type(), EventType::CheckCompleted);
        assert_eq!(event.payload.check_id(), check_id);
        match event.payload {
            EventPayload::CheckCompleted(c) => {
                assert_eq!(c.risk_score.score(), 85);
                assert_eq!(c.risk_level, RiskLevel::Critical);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_type() {
        let raw = serde_json::json!({
            "id": Uuid::new_v4(),
            "type": "check.archived",
            "timestamp": "2026-01-01T00:00:00Z",
            "payload": {}
        });
        assert!(matches!(
            Event::decode(raw.to_string().as_bytes()),
            Err(EventDecodeError::UnknownType(t)) if t == "check.archived"
        ));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(Event::decode(b"not json"), Err(EventDecodeError::Malformed(_))));

        let missing_field = serde_json::json!({
            "id": Uuid::new_v4(),
            "type": "check.failed",
            "timestamp": "2026-01-01T00:00:00Z",
            "payload": { "check_id": Uuid::new_v4() }
        });
        assert!(matches!(
            Event::decode(missing_field.to_string().as_bytes()),
            Err(EventDecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_routing_keys() {
        assert_eq!(EventType::CheckFailed.routing_key(), "check.failed");
        assert_eq!("report.ready".parse::<EventType>().unwrap(), EventType::ReportReady);
    }
}
