//! Boundary forwarding between an embedding document and its frames.
//!
//! Delivery first tries a native dispatch on the target. When the target is
//! cross-origin the envelope is re-wrapped and posted as a message instead,
//! unless it still carries a raw private name.

use crate::activity::{Activity, ActivityLog};
use crate::context::{BrowsingContext, DeliveryTarget};
use crate::frames::FrameInventory;
use crate::registry::EventRegistry;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tracing::{debug, trace, warn};
use train_proto::{Error, EventEnvelope, EventSource, Result, SYSTEM_IFRAME_INIT};

/// Progress of the catalog handshake as seen from one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    /// No catalog has been exchanged yet.
    #[default]
    Unregistered,
    /// An embedded context sent its catalog and waits for the parent's.
    AwaitingAck,
    /// A catalog from the other side has been merged.
    Synced,
}

/// Borrowed view over the parts of a bus that forwarding needs.
pub struct Forwarder<'a> {
    pub context: &'a dyn BrowsingContext,
    pub registry: &'a RefCell<EventRegistry>,
    pub frames: &'a RefCell<FrameInventory>,
    pub activity: &'a RefCell<ActivityLog>,
}

impl Forwarder<'_> {
    /// Delivers one envelope to one target.
    ///
    /// `role` is the source recorded on the envelope if it has to be posted.
    pub fn deliver(
        &self,
        envelope: &EventEnvelope,
        target: &dyn DeliveryTarget,
        role: EventSource,
    ) -> Result<()> {
        match target.dispatch_event(envelope) {
            Ok(()) => {
                trace!(event = %envelope.event_name, target = %target.label(), "Event dispatched");
                Ok(())
            }
            Err(err) if err.is_same_origin_violation() => {
                warn!(target = %target.label(), "Dispatch blocked across origins, posting message");
                let raw_namespace = self.registry.borrow().namespace_of(&envelope.event_name);
                if raw_namespace.is_some_and(|namespace| !namespace.crosses_boundary_raw()) {
                    return Err(Error::PrivacyFault {
                        event_name: envelope.event_name.clone(),
                    });
                }
                target.post_message(envelope.forwarded(role))?;
                debug!(event = %envelope.event_name, target = %target.label(), "Event posted");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Forwards toward the parent when embedded, otherwise to every frame
    /// matching the registered selectors.
    pub fn forward(&self, envelope: &EventEnvelope) -> Result<()> {
        if self.context.is_embedded() {
            debug!(event = %envelope.event_name, "Forwarding from frame to parent");
            self.forward_to_parent(envelope)
        } else {
            debug!(event = %envelope.event_name, "Forwarding from parent to frames");
            self.forward_to_frames(envelope)
        }
    }

    fn forward_to_parent(&self, envelope: &EventEnvelope) -> Result<()> {
        let Some(parent) = self.context.parent() else {
            return Ok(());
        };
        self.activity.borrow_mut().post(
            Activity::new("forwarding", EventSource::Iframe)
                .with_target(EventSource::Parent.as_str())
                .with_event(&envelope.event_name),
        );
        self.deliver(envelope, parent.as_ref(), EventSource::Iframe)
    }

    fn forward_to_frames(&self, envelope: &EventEnvelope) -> Result<()> {
        let selectors = self.frames.borrow().selectors().to_vec();
        let frames = self.context.query_frames(&selectors);
        if frames.is_empty() {
            debug!(
                selectors = ?selectors,
                "No matching frames found; register selectors for embedded frames"
            );
        }

        for frame in frames {
            self.activity.borrow_mut().post(
                Activity::new("forwarding", EventSource::Parent)
                    .with_target(frame.label())
                    .with_event(&envelope.event_name),
            );
            self.deliver(envelope, frame.as_ref(), EventSource::Parent)?;
        }
        Ok(())
    }

    /// Sends the current Public catalog across the boundary on the reserved
    /// handshake event.
    pub fn forward_public_catalog(&self, source: EventSource) -> Result<()> {
        let public_events = self.registry.borrow().public_events().to_vec();
        debug!(source = %source, count = public_events.len(), "Forwarding public catalog");

        let envelope = EventEnvelope::new(
            SYSTEM_IFRAME_INIT,
            Some(serde_json::json!({ "publicEvents": public_events })),
        );
        self.activity.borrow_mut().post(
            Activity::new("catalog", source)
                .with_event(SYSTEM_IFRAME_INIT)
                .with_details(&envelope.payload),
        );
        self.forward(&envelope)
    }
}

/// Reads the public names out of a handshake payload. Accepts a list or a
/// single name.
pub fn catalog_from_payload(payload: Option<&serde_json::Value>) -> Vec<String> {
    match payload.and_then(|payload| payload.get("publicEvents")) {
        Some(serde_json::Value::Array(names)) => names
            .iter()
            .filter_map(|name| name.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(name)) => vec![name.clone()],
        _ => Vec::new(),
    }
}
