//! Pre/post processing hooks wrapped around every facade operation.
//!
//! Each operation kind has an optional pre and post slot, and a `Default`
//! slot catches kinds without their own hook. A pre-processor receives the
//! operation's arguments and returns the arguments the operation proceeds
//! with. Post-processors only observe.

use crate::context::Listener;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};
use train_proto::{EventStatus, Operation};

/// Data handed to `publish`: a value, or a closure producing it on demand.
#[derive(Clone)]
pub enum EventData {
    Value(Option<serde_json::Value>),
    Deferred(Rc<dyn Fn() -> serde_json::Value>),
}

impl EventData {
    /// No payload.
    pub fn none() -> Self {
        EventData::Value(None)
    }

    /// Defers producing the payload until publish time.
    pub fn deferred<F>(producer: F) -> Self
    where
        F: Fn() -> serde_json::Value + 'static,
    {
        EventData::Deferred(Rc::new(producer))
    }

    /// Returns the payload, invoking a deferred producer once.
    pub fn collect(&self) -> Option<serde_json::Value> {
        match self {
            EventData::Value(value) => value.clone(),
            EventData::Deferred(producer) => Some(producer()),
        }
    }
}

impl From<serde_json::Value> for EventData {
    fn from(value: serde_json::Value) -> Self {
        EventData::Value(Some(value))
    }
}

impl From<Option<serde_json::Value>> for EventData {
    fn from(value: Option<serde_json::Value>) -> Self {
        EventData::Value(value)
    }
}

impl fmt::Debug for EventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventData::Value(value) => f.debug_tuple("Value").field(value).finish(),
            EventData::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Arguments of one facade call, as seen by the processors.
#[derive(Clone)]
pub enum Invocation {
    Publish { event_name: String, data: EventData },
    PublishStatus { event_name: String, status: EventStatus },
    Subscribe { event_name: String, callback: Listener },
    SubscribeStatus { event_name: String, callback: Listener },
    Unsubscribe { event_name: String },
    UnsubscribeStatus { event_name: String },
    UnsubscribeAll,
}

impl Invocation {
    pub fn operation(&self) -> Operation {
        match self {
            Invocation::Publish { .. } => Operation::Publish,
            Invocation::PublishStatus { .. } => Operation::PublishStatus,
            Invocation::Subscribe { .. } => Operation::Subscribe,
            Invocation::SubscribeStatus { .. } => Operation::SubscribeStatus,
            Invocation::Unsubscribe { .. } => Operation::Unsubscribe,
            Invocation::UnsubscribeStatus { .. } => Operation::UnsubscribeStatus,
            Invocation::UnsubscribeAll => Operation::UnsubscribeAll,
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        match self {
            Invocation::Publish { event_name, .. }
            | Invocation::PublishStatus { event_name, .. }
            | Invocation::Subscribe { event_name, .. }
            | Invocation::SubscribeStatus { event_name, .. }
            | Invocation::Unsubscribe { event_name }
            | Invocation::UnsubscribeStatus { event_name } => Some(event_name),
            Invocation::UnsubscribeAll => None,
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.operation().as_str());
        if let Some(event_name) = self.event_name() {
            out.field("event_name", &event_name);
        }
        match self {
            Invocation::Publish { data, .. } => out.field("data", data),
            Invocation::PublishStatus { status, .. } => out.field("status", status),
            _ => &mut out,
        };
        out.finish()
    }
}

/// Hook slot: one per operation kind, plus the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorTarget {
    Default,
    Operation(Operation),
}

impl From<Operation> for ProcessorTarget {
    fn from(operation: Operation) -> Self {
        ProcessorTarget::Operation(operation)
    }
}

/// Transforms an operation's arguments before it runs.
pub type PreProcessor = Rc<dyn Fn(Invocation) -> Invocation>;

/// Observes an operation after it ran, given the arguments as called and
/// as processed.
pub type PostProcessor = Rc<dyn Fn(&Invocation, &Invocation)>;

/// Registered pre and post processors.
#[derive(Default)]
pub struct ProcessingPipeline {
    pre: HashMap<ProcessorTarget, PreProcessor>,
    post: HashMap<ProcessorTarget, PostProcessor>,
}

impl fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingPipeline")
            .field("pre", &self.pre.keys().collect::<Vec<_>>())
            .field("post", &self.post.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs pre-processors. Replacing an installed slot is allowed but
    /// logged as a warning.
    pub fn add_pre_processors<I>(&mut self, processors: I)
    where
        I: IntoIterator<Item = (ProcessorTarget, PreProcessor)>,
    {
        for (target, processor) in processors {
            if self.pre.insert(target, processor).is_some() {
                warn!(target = ?target, "Overriding an existing pre processor");
            } else {
                debug!(target = ?target, "Pre processor added");
            }
        }
    }

    /// Installs post-processors. Replacing an installed slot is allowed but
    /// logged as a warning.
    pub fn add_post_processors<I>(&mut self, processors: I)
    where
        I: IntoIterator<Item = (ProcessorTarget, PostProcessor)>,
    {
        for (target, processor) in processors {
            if self.post.insert(target, processor).is_some() {
                warn!(target = ?target, "Overriding an existing post processor");
            } else {
                debug!(target = ?target, "Post processor added");
            }
        }
    }

    /// The pre-processor that applies to `operation`, if any.
    pub fn pre_for(&self, operation: Operation) -> Option<PreProcessor> {
        self.pre
            .get(&ProcessorTarget::Operation(operation))
            .or_else(|| self.pre.get(&ProcessorTarget::Default))
            .cloned()
    }

    /// The post-processor that applies to `operation`, if any.
    pub fn post_for(&self, operation: Operation) -> Option<PostProcessor> {
        self.post
            .get(&ProcessorTarget::Operation(operation))
            .or_else(|| self.post.get(&ProcessorTarget::Default))
            .cloned()
    }

    /// Runs the applicable pre-processor, or passes the arguments through.
    ///
    /// The hook runs after the pipeline borrow is released.
    pub fn run_pre(pipeline: &RefCell<Self>, invocation: Invocation) -> Invocation {
        let operation = invocation.operation();
        let processor = pipeline.borrow().pre_for(operation);
        debug!(operation = %operation, hooked = processor.is_some(), "Running pre processor");
        match processor {
            Some(processor) => processor(invocation),
            None => invocation,
        }
    }

    /// Runs the applicable post-processor, if any.
    pub fn run_post(pipeline: &RefCell<Self>, called: &Invocation, processed: &Invocation) {
        let operation = called.operation();
        let processor = pipeline.borrow().post_for(operation);
        debug!(operation = %operation, hooked = processor.is_some(), "Running post processor");
        if let Some(processor) = processor {
            processor(called, processed);
        }
    }
}
