//! Seams to the hosting document tree.
//!
//! The bus never touches a concrete DOM. A host provides a
//! [`BrowsingContext`] for the document the bus lives in, and hands out
//! [`DeliveryTarget`]s for its parent and its embedded frames.

use std::rc::Rc;
use train_proto::{EventEnvelope, Result, WireMessage};

/// A native listener or subscriber callback.
pub type Listener = Rc<dyn Fn(&EventEnvelope) -> Result<()>>;

/// Receiver of inbound cross-frame messages.
pub type MessageListener = Rc<dyn Fn(&WireMessage) -> Result<()>>;

/// Something an envelope can be delivered to.
pub trait DeliveryTarget {
    /// Human-readable identity used in logs and activity records.
    fn label(&self) -> String;

    /// Dispatches the envelope as a native event, running the target's
    /// listeners for `envelope.event_name` synchronously.
    ///
    /// Fails with a same-origin violation when the caller may not reach
    /// into the target directly. Listener failures propagate.
    fn dispatch_event(&self, envelope: &EventEnvelope) -> Result<()>;

    /// Queues a structured message for the target. Never blocks and cannot
    /// be withdrawn.
    fn post_message(&self, message: WireMessage) -> Result<()>;
}

/// The document a bus instance is bootstrapped in.
pub trait BrowsingContext {
    fn label(&self) -> String;

    /// True when this document is itself embedded in a parent document.
    fn is_embedded(&self) -> bool;

    /// Registers a native listener under `key`.
    fn add_listener(&self, key: &str, listener: Listener);

    /// Removes one registration of `listener` under `key`.
    fn remove_listener(&self, key: &str, listener: &Listener);

    /// Installs the process-wide receiver for inbound messages.
    fn add_message_listener(&self, listener: MessageListener);

    /// Target for local dispatch on this document.
    fn document(&self) -> Rc<dyn DeliveryTarget>;

    /// The embedding document, when embedded.
    fn parent(&self) -> Option<Rc<dyn DeliveryTarget>>;

    /// Embedded frames of this document matching any of the selectors.
    fn query_frames(&self, selectors: &[String]) -> Vec<Rc<dyn DeliveryTarget>>;
}

/// Returns true if both handles point at the same callback.
pub fn same_listener(a: &Listener, b: &Listener) -> bool {
    Rc::ptr_eq(a, b)
}
