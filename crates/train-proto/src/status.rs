//! Status values carried by `<name>/status` events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix appended to an event name to form its status event.
pub const STATUS_SUFFIX: &str = "/status";

/// Progress of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Loading,
    Idle,
    Failed,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Loading => "LOADING",
            EventStatus::Idle => "IDLE",
            EventStatus::Failed => "FAILED",
        }
    }

    /// Builds the `{ "status": ... }` payload of a status event.
    pub fn to_payload(self) -> serde_json::Value {
        serde_json::json!({ "status": self })
    }

    /// Reads the status back out of a status-event payload.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        payload
            .get("status")
            .and_then(|status| serde_json::from_value(status.clone()).ok())
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the status event name derived from `event_name`.
pub fn status_event_name(event_name: &str) -> String {
    format!("{event_name}{STATUS_SUFFIX}")
}
