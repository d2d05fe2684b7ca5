//! Structured engine events (§3 `Event`), the payload the Event Sink Adapter
//! (C11) batches, dedups, and flushes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Start,
    Stop,
    TradeExecuted,
    TradeFailed,
    CycleComplete,
    DriftHalt,
    Pause,
    Resume,
    WebsocketConnected,
    WebsocketDisconnected,
    ValidationError,
    Performance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub severity: Severity,
    pub message: String,
    pub metadata: Value,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            event_type,
            severity,
            message: message.into(),
            metadata: Value::Null,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// CRITICAL events bypass the Event Sink's batching (§4.11).
    pub fn is_critical(&self) -> bool {
        matches!(self.severity, Severity::Critical)
    }

    /// A coarse key used for the Event Sink's short-window deduplication:
    /// event type plus whatever metadata the caller considers identifying.
    pub fn dedup_key(&self, metadata_subset: &[&str]) -> String {
        let mut key = format!("{:?}", self.event_type);
        for field in metadata_subset {
            if let Some(v) = self.metadata.get(field) {
                key.push(':');
                key.push_str(&v.to_string());
            }
        }
        key
    }
}
