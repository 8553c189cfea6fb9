// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider event envelope shared by webhooks, reconciliation and replay.

use courier_core::types::{EventType, RemoteActivity};
use courier_core::CourierError;
use serde::{Deserialize, Serialize};

/// `{"type": ..., "data": {...}}` as posted by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: RemoteActivity,
}

impl EventEnvelope {
    pub fn parse(raw: &str) -> Result<Self, CourierError> {
        let envelope: Self = serde_json::from_str(raw)
            .map_err(|e| CourierError::MalformedPayload(format!("invalid event body: {e}")))?;
        if envelope.data.id.trim().is_empty() {
            return Err(CourierError::MalformedPayload("event data.id is empty".into()));
        }
        Ok(envelope)
    }

    /// Wraps a feed record in the envelope its creation webhook would carry.
    pub fn from_remote(activity: RemoteActivity) -> Self {
        Self {
            event_type: EventType::for_activity(activity.kind, activity.direction),
            data: activity,
        }
    }

    /// Dedup key. A status callback is distinct per reported status, so
    /// `sent` and `delivered` callbacks for the same message both apply.
    pub fn external_id(&self) -> String {
        match self.event_type {
            EventType::MessageStatus => format!("{}:{}", self.data.id, self.data.status),
            _ => self.data.id.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, CourierError> {
        serde_json::to_string(self)
            .map_err(|e| CourierError::Internal(format!("failed to encode event: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::ActivityStatus;

    const RECEIVED: &str = r#"{"type":"message.received","data":{"id":"msg_1",
        "direction":"inbound","kind":"message","from":"+15550001111",
        "to":"+15550002222","body":"hi","media_urls":[],"status":"received",
        "created_at":"2026-01-01T00:00:00Z"}}"#;

    #[test]
    fn creation_events_use_the_activity_id() {
        let env = EventEnvelope::parse(RECEIVED).unwrap();
        assert_eq!(env.event_type, EventType::MessageReceived);
        assert_eq!(env.external_id(), "msg_1");
    }

    #[test]
    fn status_events_include_the_status() {
        let raw = RECEIVED
            .replace("message.received", "message.status")
            .replace("\"received\"", "\"delivered\"");
        let env = EventEnvelope::parse(&raw).unwrap();
        assert_eq!(env.external_id(), "msg_1:delivered");
        assert_eq!(env.data.status, ActivityStatus::Delivered);
    }

    #[test]
    fn rejects_unknown_event_type() {
        let raw = RECEIVED.replace("message.received", "message.exploded");
        assert!(matches!(
            EventEnvelope::parse(&raw),
            Err(CourierError::MalformedPayload(_))
        ));
    }

    #[test]
    fn rejects_non_json() {
        assert!(EventEnvelope::parse("<xml/>").is_err());
    }

    #[test]
    fn feed_records_map_to_creation_events() {
        let env = EventEnvelope::parse(RECEIVED).unwrap();
        let rebuilt = EventEnvelope::from_remote(env.data.clone());
        assert_eq!(rebuilt, env);
        assert_eq!(rebuilt.external_id(), "msg_1");
    }
}
