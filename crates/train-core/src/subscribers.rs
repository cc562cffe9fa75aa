//! Subscriber directory: insertion-ordered `(dispatch key, callback)` pairs.

use crate::context::Listener;
use crate::registry::EventRegistry;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};
use train_proto::{EventEnvelope, Result};

/// A callback registered under a dispatch key (raw name or private token).
#[derive(Clone)]
pub struct Subscription {
    pub key: String,
    pub callback: Listener,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Table of subscriptions plus the last envelope published per key.
///
/// Duplicates of the same key and callback are kept and removed together.
#[derive(Debug, Default)]
pub struct SubscriberDirectory {
    subscriptions: Vec<Subscription>,

    /// Latest envelope per dispatch key, for late subscribers.
    retained: HashMap<String, EventEnvelope>,
}

impl SubscriberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscription.
    pub fn add(&mut self, key: impl Into<String>, callback: Listener) {
        let key = key.into();
        trace!(key = %key, "Subscriber added");
        self.subscriptions.push(Subscription { key, callback });
    }

    /// Callbacks subscribed under `key`, in insertion order.
    pub fn by_key(&self, key: &str) -> Vec<Listener> {
        let callbacks: Vec<Listener> = self
            .subscriptions
            .iter()
            .filter(|subscription| subscription.key == key)
            .map(|subscription| subscription.callback.clone())
            .collect();
        trace!(key = %key, count = callbacks.len(), "Subscribers matched");
        callbacks
    }

    /// Drops every subscription whose key is in `keys` and returns them, so
    /// the caller can detach the matching native listeners.
    pub fn remove_by_keys(&mut self, keys: &[String]) -> Vec<Subscription> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.subscriptions)
            .into_iter()
            .partition(|subscription| keys.contains(&subscription.key));
        self.subscriptions = kept;
        debug!(keys = ?keys, removed = removed.len(), "Subscribers removed");
        removed
    }

    /// Empties the directory and returns everything that was in it.
    pub fn clear(&mut self) -> Vec<Subscription> {
        let removed = std::mem::take(&mut self.subscriptions);
        debug!(removed = removed.len(), "Subscribers cleared");
        removed
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Remembers `envelope` as the latest for its key.
    pub fn retain(&mut self, envelope: &EventEnvelope) {
        self.retained
            .insert(envelope.event_name.clone(), envelope.clone());
    }

    /// The latest retained envelope for `key`.
    pub fn retained(&self, key: &str) -> Option<&EventEnvelope> {
        self.retained.get(key)
    }

    /// Delivers an inbound envelope to every subscriber of its event name.
    ///
    /// The name is validated without a status reporter, so unknown names
    /// reach nobody. Callbacks run in insertion order; the first failure
    /// stops the pass and is returned. Borrows are released before each
    /// callback runs, so callbacks may use the bus.
    pub fn dispatch(
        directory: &RefCell<Self>,
        registry: &RefCell<EventRegistry>,
        envelope: &EventEnvelope,
    ) -> Result<usize> {
        let matched = registry
            .borrow()
            .check(&envelope.event_name, "callback", None)?;

        let mut invoked = 0;
        for event_name in matched {
            let callbacks = directory.borrow().by_key(&event_name);
            for callback in callbacks {
                callback(envelope)?;
                invoked += 1;
            }
        }
        debug!(event = %envelope.event_name, invoked, "Dispatched inbound event");
        Ok(invoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::same_listener;
    use std::rc::Rc;
    use train_proto::Error;

    fn recorder() -> (Listener, Rc<RefCell<Vec<String>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let listener: Listener = Rc::new(move |envelope: &EventEnvelope| {
            seen_clone.borrow_mut().push(envelope.event_name.clone());
            Ok(())
        });
        (listener, seen)
    }

    #[test]
    fn test_by_key_keeps_insertion_order() {
        let mut directory = SubscriberDirectory::new();
        let (first, _) = recorder();
        let (second, _) = recorder();
        directory.add("a/b/c", first.clone());
        directory.add("x/y/z", second.clone());
        directory.add("a/b/c", second.clone());

        let callbacks = directory.by_key("a/b/c");
        assert_eq!(callbacks.len(), 2);
        assert!(same_listener(&callbacks[0], &first));
        assert!(same_listener(&callbacks[1], &second));
    }

    #[test]
    fn test_duplicates_removed_together() {
        let mut directory = SubscriberDirectory::new();
        let (listener, _) = recorder();
        directory.add("a/b/c", listener.clone());
        directory.add("a/b/c", listener.clone());
        directory.add("d/e/f", listener.clone());

        let removed = directory.remove_by_keys(&["a/b/c".to_string()]);
        assert_eq!(removed.len(), 2);
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.by_key("d/e/f").len(), 1);
        assert!(directory.by_key("a/b/c").is_empty());
    }

    #[test]
    fn test_clear_returns_everything() {
        let mut directory = SubscriberDirectory::new();
        let (listener, _) = recorder();
        directory.add("a/b/c", listener.clone());
        directory.add("d/e/f", listener);

        assert_eq!(directory.clear().len(), 2);
        assert!(directory.is_empty());
    }

    #[test]
    fn test_retained_keeps_latest() {
        let mut directory = SubscriberDirectory::new();
        directory.retain(&EventEnvelope::new("a/b/c", Some(serde_json::json!(1))));
        directory.retain(&EventEnvelope::new("a/b/c", Some(serde_json::json!(2))));

        let latest = directory.retained("a/b/c").unwrap();
        assert_eq!(latest.payload, Some(serde_json::json!(2)));
        assert!(directory.retained("d/e/f").is_none());
    }

    #[test]
    fn test_dispatch_invokes_matching_subscribers() {
        let directory = RefCell::new(SubscriberDirectory::new());
        let registry = RefCell::new(EventRegistry::new());
        registry.borrow_mut().enlist_public(["app/cart/item/add"]).unwrap();

        let (listener, seen) = recorder();
        directory.borrow_mut().add("app/cart/item/add", listener.clone());
        directory.borrow_mut().add("app/cart/item/remove", listener);

        let envelope = EventEnvelope::new("app/cart/item/add", None);
        let invoked = SubscriberDirectory::dispatch(&directory, &registry, &envelope).unwrap();

        assert_eq!(invoked, 1);
        assert_eq!(*seen.borrow(), vec!["app/cart/item/add"]);
    }

    #[test]
    fn test_dispatch_of_unknown_name_reaches_nobody() {
        let directory = RefCell::new(SubscriberDirectory::new());
        let registry = RefCell::new(EventRegistry::new());
        let (listener, seen) = recorder();
        directory.borrow_mut().add("not/enlisted", listener);

        let envelope = EventEnvelope::new("not/enlisted", None);
        let invoked = SubscriberDirectory::dispatch(&directory, &registry, &envelope).unwrap();

        assert_eq!(invoked, 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_dispatch_stops_at_first_failure() {
        let directory = RefCell::new(SubscriberDirectory::new());
        let registry = RefCell::new(EventRegistry::new());
        registry.borrow_mut().enlist_public(["a/b/c"]).unwrap();

        let failing: Listener = Rc::new(|_: &EventEnvelope| Err(Error::callback("boom")));
        let (after, seen) = recorder();
        directory.borrow_mut().add("a/b/c", failing);
        directory.borrow_mut().add("a/b/c", after);

        let envelope = EventEnvelope::new("a/b/c", None);
        let err = SubscriberDirectory::dispatch(&directory, &registry, &envelope).unwrap_err();

        assert!(matches!(err, Error::Callback(ref msg) if msg == "boom"));
        assert!(seen.borrow().is_empty());
    }
}
