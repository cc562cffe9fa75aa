//! In-memory document tree with same-origin enforcement and a message queue.

use crate::context::{BrowsingContext, DeliveryTarget, Listener, MessageListener, same_listener};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use tracing::trace;
use train_proto::{Error, EventEnvelope, Result, WireMessage};

type Queue = Rc<RefCell<VecDeque<(Weak<Window>, Value)>>>;

/// A top-level page and every frame embedded below it.
///
/// Posted messages are queued page-wide and delivered by
/// [`Page::run_until_idle`], the way a browser delivers them on a later task.
#[derive(Debug)]
pub struct Page {
    top: Rc<Window>,
    queue: Queue,
}

impl Page {
    pub fn new(origin: &str) -> Self {
        let queue: Queue = Rc::default();
        let top = Window::new("top", origin, None, None, Rc::clone(&queue));
        Self { top, queue }
    }

    pub fn top(&self) -> Rc<Window> {
        Rc::clone(&self.top)
    }

    /// Embeds a frame with CSS class `class` into `parent`.
    pub fn embed(&self, parent: &Rc<Window>, class: &str, origin: &str) -> Rc<Window> {
        let frame = Window::new(
            class,
            origin,
            Some(class.to_string()),
            Some(Rc::downgrade(parent)),
            Rc::clone(&self.queue),
        );
        parent.children.borrow_mut().push(Rc::clone(&frame));
        frame
    }

    /// Number of messages waiting for delivery.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Delivers queued messages, including ones posted while delivering,
    /// until the queue is empty. Returns how many were delivered.
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut delivered = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some((target, value)) = next else {
                return Ok(delivered);
            };
            let Some(window) = target.upgrade() else {
                continue;
            };
            let message = WireMessage::from_value(value)?;
            window.receive(&message)?;
            delivered += 1;
        }
    }
}

/// One document in the tree.
pub struct Window {
    name: String,
    origin: String,
    class: Option<String>,
    parent: Option<Weak<Window>>,
    children: RefCell<Vec<Rc<Window>>>,
    listeners: RefCell<Vec<(String, Listener)>>,
    message_listeners: RefCell<Vec<MessageListener>>,
    queue: Queue,
    this: Weak<Window>,
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("children", &self.children.borrow().len())
            .field("listeners", &self.listeners.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Window {
    fn new(
        name: &str,
        origin: &str,
        class: Option<String>,
        parent: Option<Weak<Window>>,
        queue: Queue,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            name: name.to_string(),
            origin: origin.to_string(),
            class,
            parent,
            children: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            message_listeners: RefCell::new(Vec::new()),
            queue,
            this: this.clone(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Native listeners currently registered under `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(registered, _)| registered == key)
            .count()
    }

    fn port(&self, target: Weak<Window>) -> Rc<dyn DeliveryTarget> {
        Rc::new(Port {
            caller_origin: self.origin.clone(),
            target,
            queue: Rc::clone(&self.queue),
        })
    }

    fn fire(&self, envelope: &EventEnvelope) -> Result<()> {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(key, _)| *key == envelope.event_name)
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        trace!(window = %self.name, event = %envelope.event_name, count = listeners.len(), "Firing");
        for listener in listeners {
            listener(envelope)?;
        }
        Ok(())
    }

    fn receive(&self, message: &WireMessage) -> Result<()> {
        let listeners: Vec<MessageListener> = self.message_listeners.borrow().clone();
        for listener in listeners {
            listener(message)?;
        }
        Ok(())
    }

    fn matches_any(&self, selectors: &[String]) -> bool {
        let Some(class) = &self.class else {
            return false;
        };
        selectors
            .iter()
            .any(|selector| selector.strip_prefix('.').unwrap_or(selector) == class)
    }
}

impl BrowsingContext for Window {
    fn label(&self) -> String {
        format!("{}({})", self.name, self.origin)
    }

    fn is_embedded(&self) -> bool {
        self.parent.is_some()
    }

    fn add_listener(&self, key: &str, listener: Listener) {
        let mut listeners = self.listeners.borrow_mut();
        let duplicate = listeners
            .iter()
            .any(|(registered, existing)| registered == key && same_listener(existing, &listener));
        if !duplicate {
            listeners.push((key.to_string(), listener));
        }
    }

    fn remove_listener(&self, key: &str, listener: &Listener) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(position) = listeners
            .iter()
            .position(|(registered, existing)| registered == key && same_listener(existing, listener))
        {
            listeners.remove(position);
        }
    }

    fn add_message_listener(&self, listener: MessageListener) {
        self.message_listeners.borrow_mut().push(listener);
    }

    fn document(&self) -> Rc<dyn DeliveryTarget> {
        self.port(self.this.clone())
    }

    fn parent(&self) -> Option<Rc<dyn DeliveryTarget>> {
        self.parent.as_ref().map(|parent| self.port(parent.clone()))
    }

    fn query_frames(&self, selectors: &[String]) -> Vec<Rc<dyn DeliveryTarget>> {
        self.children
            .borrow()
            .iter()
            .filter(|child| child.matches_any(selectors))
            .map(|child| self.port(Rc::downgrade(child)))
            .collect()
    }
}

/// A handle from one window onto another.
struct Port {
    caller_origin: String,
    target: Weak<Window>,
    queue: Queue,
}

impl DeliveryTarget for Port {
    fn label(&self) -> String {
        self.target
            .upgrade()
            .map_or_else(|| "detached".to_string(), |window| window.label())
    }

    fn dispatch_event(&self, envelope: &EventEnvelope) -> Result<()> {
        let Some(window) = self.target.upgrade() else {
            return Ok(());
        };
        if window.origin != self.caller_origin {
            return Err(Error::same_origin_violation(format!(
                "Blocked a frame with origin \"{}\" from accessing a cross-origin frame.",
                self.caller_origin
            )));
        }
        window.fire(envelope)
    }

    fn post_message(&self, message: WireMessage) -> Result<()> {
        let value = message.to_value()?;
        self.queue.borrow_mut().push_back((self.target.clone(), value));
        Ok(())
    }
}
