//! The canonical event envelope and its wire form.
//!
//! An envelope is what subscribers receive. When an envelope has to cross the
//! frame boundary by message passing it is re-wrapped as a [`WireMessage`]
//! whose `detail` names the forwarding role as its source.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved Default event used by the frame handshake.
pub const SYSTEM_IFRAME_INIT: &str = "system/iframe/init";

/// Role of the context an envelope was emitted or forwarded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    /// Forwarded by an embedded context toward its parent.
    Iframe,
    /// Forwarded by the embedding context toward its frames.
    Parent,
    /// Emitted by the local bus itself.
    Portal,
}

impl EventSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::Iframe => "IFRAME",
            EventSource::Parent => "PARENT",
            EventSource::Portal => "PORTAL",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch unit handed to subscribers.
///
/// `event_name` holds the token for private names and the raw name otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_name: String,
    pub event_source: EventSource,
    pub time_stamp: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl EventEnvelope {
    /// Creates an envelope emitted by the local bus, stamped now.
    pub fn new(event_name: impl Into<String>, payload: Option<serde_json::Value>) -> Self {
        Self {
            event_name: event_name.into(),
            event_source: EventSource::Portal,
            time_stamp: timestamp(),
            payload,
        }
    }

    /// Replaces the timestamp, so all matches of one publish share it.
    pub fn with_timestamp(mut self, time_stamp: impl Into<String>) -> Self {
        self.time_stamp = time_stamp.into();
        self
    }

    /// Re-wraps this envelope for message passing from the `role` side.
    pub fn forwarded(&self, role: EventSource) -> WireMessage {
        WireMessage {
            detail: Self {
                event_source: role,
                ..self.clone()
            },
        }
    }
}

/// Cross-frame message body: `{ "detail": { eventName, eventSource, timeStamp, payload } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub detail: EventEnvelope,
}

impl WireMessage {
    /// Serializes the message the way a structured clone would see it.
    pub fn to_value(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Returns the current local time in the bus's human-readable format.
pub fn timestamp() -> String {
    chrono::Local::now()
        .format("%-m/%-d/%Y, %-I:%M:%S %p")
        .to_string()
}
