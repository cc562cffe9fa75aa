//! Append-only diagnostic log of bus activity.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use train_proto::EventSource;

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Unix timestamp in milliseconds when the record was created.
    pub ts: u64,

    /// Operation or component that produced the record.
    pub invoked_by: String,

    pub source: EventSource,

    /// Where the event went, when it went somewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Event name or dispatch key involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl Activity {
    /// Creates a record stamped now.
    pub fn new(invoked_by: impl Into<String>, source: EventSource) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            ts,
            invoked_by: invoked_by.into(),
            source,
            target: None,
            event: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_details(mut self, details: impl Serialize) -> Self {
        self.details = serde_json::to_value(details).unwrap_or(serde_json::Value::Null);
        self
    }
}

/// In-memory activity log.
#[derive(Debug, Default)]
pub struct ActivityLog {
    records: Vec<Activity>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, activity: Activity) {
        self.records.push(activity);
    }

    /// All records ordered by timestamp; ties keep posting order.
    pub fn show_all(&self) -> Vec<Activity> {
        let mut records = self.records.clone();
        records.sort_by_key(|record| record.ts);
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
