// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The event envelope carried on the wire.
///
/// Immutable once constructed. The relay treats the serialized form as an
/// opaque payload; only the indexer deserializes it back, to derive an
/// index name from `time` and `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Producing application, e.g. `workflow-client`.
    pub app: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub time: DateTime<Utc>,
    /// Domain-specific payload; constructed by the caller, never
    /// inspected here.
    pub data: serde_json::Value,
}

impl EventMessage {
    pub fn new(app: impl Into<String>, event_type: impl Into<String>, data: serde_json::Value) -> Self {
        EventMessage {
            app: app.into(),
            event_type: event_type.into(),
            time: Utc::now(),
            data,
        }
    }
}

/// Free-form log payload variant, carried in `EventMessage::data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessageData {
    pub system: String,
    pub start_time: DateTime<Utc>,
    pub time: DateTime<Utc>,
    pub level: String,
    #[serde(rename = "type")]
    pub log_type: String,
    pub content: serde_json::Value,
}

/// Workflow task status as reported by the workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EventStatus {
    Unknown,
    Complete,
    Queued,
    Aborted,
    Submitted,
    Active,
    Suspended,
}

const STATUS_NAMES: [(&str, EventStatus); 7] = [
    ("unknown", EventStatus::Unknown),
    ("complete", EventStatus::Complete),
    ("queued", EventStatus::Queued),
    ("aborted", EventStatus::Aborted),
    ("submitted", EventStatus::Submitted),
    ("active", EventStatus::Active),
    ("suspended", EventStatus::Suspended),
];

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = STATUS_NAMES
            .iter()
            .find(|(_, status)| status == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown");
        f.write_str(name)
    }
}

impl FromStr for EventStatus {
    type Err = std::convert::Infallible;

    /// Unrecognized names map to `Unknown` rather than failing, matching
    /// the wire behavior producers rely on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(STATUS_NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, status)| *status)
            .unwrap_or(EventStatus::Unknown))
    }
}

impl From<EventStatus> for String {
    fn from(status: EventStatus) -> String {
        status.to_string()
    }
}

impl TryFrom<String> for EventStatus {
    type Error = std::convert::Infallible;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_field_names() {
        let message = EventMessage {
            app: "workflow-client".to_string(),
            event_type: "workflow-command".to_string(),
            time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            data: json!({"command": "init"}),
        };

        let encoded = serde_json::to_value(&message).unwrap();
        assert_eq!(encoded["app"], "workflow-client");
        assert_eq!(encoded["type"], "workflow-command");
        assert!(encoded["time"].as_str().unwrap().starts_with("2024-03-01T12:30:00"));
        assert_eq!(encoded["data"]["command"], "init");
    }

    #[test]
    fn test_envelope_round_trip() {
        let message = EventMessage::new("producer", "log", json!({"level": "info"}));
        let bytes = serde_json::to_vec(&message).unwrap();
        let decoded: EventMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_event_status_names() {
        assert_eq!(EventStatus::Complete.to_string(), "complete");
        assert_eq!(EventStatus::Aborted.to_string(), "aborted");
        assert_eq!("queued".parse::<EventStatus>().unwrap(), EventStatus::Queued);
        assert_eq!("nonsense".parse::<EventStatus>().unwrap(), EventStatus::Unknown);
    }

    #[test]
    fn test_event_status_serde() {
        let status: EventStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(status, EventStatus::Active);
        assert_eq!(serde_json::to_string(&EventStatus::Suspended).unwrap(), "\"suspended\"");
    }
}
