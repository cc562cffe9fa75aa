//! The Train: public facade of the event bus.
//!
//! A `Train` is bootstrapped once per document. It owns the registry, the
//! subscriber directory, the processing pipeline and the frame inventory,
//! and sequences them for every public operation:
//!
//! 1. pre-processor
//! 2. registry check (reporting FAILED status where the operation can)
//! 3. local delivery on the document
//! 4. forwarding across the frame boundary
//! 5. post-processor
//!
//! All state lives behind `RefCell`s and no borrow is held while a
//! subscriber, processor or host callback runs, so callbacks may re-enter
//! the train.

use crate::activity::{Activity, ActivityLog};
use crate::config::TrainConfig;
use crate::context::{BrowsingContext, Listener, MessageListener};
use crate::forwarding::{Forwarder, HandshakeState, catalog_from_payload};
use crate::frames::FrameInventory;
use crate::processors::{
    EventData, Invocation, PostProcessor, PreProcessor, ProcessingPipeline, ProcessorTarget,
};
use crate::registry::EventRegistry;
use crate::subscribers::SubscriberDirectory;
use crate::wagon::WagonRecord;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};
use train_proto::{
    Error, EventEnvelope, EventSource, EventStatus, Operation, Result, SYSTEM_IFRAME_INIT,
    WireMessage, status_event_name, timestamp,
};

/// Event bus bound to one browsing context.
pub struct Train {
    context: Rc<dyn BrowsingContext>,
    registry: RefCell<EventRegistry>,
    subscribers: RefCell<SubscriberDirectory>,
    processors: RefCell<ProcessingPipeline>,
    frames: RefCell<FrameInventory>,
    activity: RefCell<ActivityLog>,
    handshake: Cell<HandshakeState>,
    acknowledge_handshake: bool,
    pub(crate) wagons: RefCell<Vec<WagonRecord>>,
}

impl fmt::Debug for Train {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Train")
            .field("context", &self.context.label())
            .field("handshake", &self.handshake.get())
            .field("subscribers", &self.subscribers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Train {
    /// Bootstraps a train in `context`.
    ///
    /// Enlists the configured events, installs the single inbound message
    /// listener and starts the catalog handshake: an embedded context sends
    /// its public catalog to its parent, an embedding context starts
    /// listening for catalogs from its frames.
    pub fn bootstrap(context: Rc<dyn BrowsingContext>, config: &TrainConfig) -> Result<Rc<Self>> {
        let train = Rc::new(Self {
            context,
            registry: RefCell::new(EventRegistry::new()),
            subscribers: RefCell::new(SubscriberDirectory::new()),
            processors: RefCell::new(ProcessingPipeline::new()),
            frames: RefCell::new(FrameInventory::new()),
            activity: RefCell::new(ActivityLog::new()),
            handshake: Cell::new(HandshakeState::Unregistered),
            acknowledge_handshake: config.acknowledge_handshake,
            wagons: RefCell::new(Vec::new()),
        });

        {
            let mut registry = train.registry.borrow_mut();
            registry.enlist_public(config.public_events.iter().cloned())?;
            registry.enlist_private(config.private_events.iter().cloned())?;
        }
        train
            .frames
            .borrow_mut()
            .register(config.frame_selectors.iter().cloned());

        Self::install_message_listener(&train);
        Self::start_handshake(&train)?;

        info!(
            context = %train.context.label(),
            embedded = train.context.is_embedded(),
            "Train bootstrapped"
        );
        Ok(train)
    }

    fn install_message_listener(train: &Rc<Self>) {
        let weak = Rc::downgrade(train);
        let listener: MessageListener = Rc::new(move |message: &WireMessage| {
            let Some(train) = weak.upgrade() else {
                return Ok(());
            };
            train.dispatch(&message.detail).map(|_| ())
        });
        train.context.add_message_listener(listener);
        debug!(context = %train.context.label(), "Message listener installed");
    }

    fn start_handshake(train: &Rc<Self>) -> Result<()> {
        let embedded = train.context.is_embedded();
        let acknowledge = !embedded && train.acknowledge_handshake;

        let weak = Rc::downgrade(train);
        let on_catalog: Listener = Rc::new(move |envelope: &EventEnvelope| {
            let Some(train) = weak.upgrade() else {
                return Ok(());
            };
            train.merge_catalog(envelope, acknowledge)
        });
        train.subscribe(SYSTEM_IFRAME_INIT, on_catalog)?;

        if embedded {
            train.handshake.set(HandshakeState::AwaitingAck);
            train.forwarder().forward_public_catalog(EventSource::Iframe)?;
        }
        Ok(())
    }

    /// Merges a catalog received on the handshake event and, when this is an
    /// acknowledging parent, answers every frame with the merged catalog.
    fn merge_catalog(&self, envelope: &EventEnvelope, acknowledge: bool) -> Result<()> {
        let public_events = catalog_from_payload(envelope.payload.as_ref());
        self.post_activity(
            Activity::new("handshake", envelope.event_source)
                .with_event(SYSTEM_IFRAME_INIT)
                .with_details(&public_events),
        );

        if !public_events.is_empty() {
            let added = self.registry.borrow_mut().enlist_public(public_events)?;
            debug!(added = ?added, "Merged public catalog from the other side");
        }
        self.handshake.set(HandshakeState::Synced);

        if acknowledge {
            self.forwarder().forward_public_catalog(EventSource::Parent)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Publishing
    // ─────────────────────────────────────────────────────────────────────

    /// Publishes `data` under `event_name` and retains it for late
    /// subscribers.
    pub fn publish(&self, event_name: &str, data: impl Into<EventData>) -> Result<()> {
        self.publish_with(event_name, data, true)
    }

    /// Publishes `data` under `event_name`.
    ///
    /// Reports LOADING on `<name>/status` first. An unknown name reports
    /// FAILED and fails with `AccessFault`. No IDLE status follows a
    /// successful publish.
    pub fn publish_with(
        &self,
        event_name: &str,
        data: impl Into<EventData>,
        store_event_data: bool,
    ) -> Result<()> {
        let called = Invocation::Publish {
            event_name: event_name.to_string(),
            data: data.into(),
        };
        let processed = ProcessingPipeline::run_pre(&self.processors, called.clone());
        let Invocation::Publish { event_name, data } = &processed else {
            return Err(mismatch(Operation::Publish, &processed));
        };
        debug!(event = %event_name, "Publishing");

        self.publish_status(event_name, EventStatus::Loading)?;
        let matched = self.check_reporting(event_name, "published")?;

        let time_stamp = timestamp();
        let payload = data.collect();

        for name in matched {
            let key = self.registry.borrow().dispatch_key(&name);
            let envelope =
                EventEnvelope::new(key, payload.clone()).with_timestamp(time_stamp.clone());

            self.post_activity(
                Activity::new(Operation::Publish.as_str(), EventSource::Portal)
                    .with_target(EventSource::Portal.as_str())
                    .with_event(&envelope.event_name),
            );
            if store_event_data {
                self.subscribers.borrow_mut().retain(&envelope);
            }
            self.emit(&envelope)?;
        }

        ProcessingPipeline::run_post(&self.processors, &called, &processed);
        Ok(())
    }

    /// Publishes `status` on `<name>/status`. Does nothing when the status
    /// event is not enlisted.
    pub fn publish_status(&self, event_name: &str, status: EventStatus) -> Result<()> {
        let called = Invocation::PublishStatus {
            event_name: event_name.to_string(),
            status,
        };
        let processed = ProcessingPipeline::run_pre(&self.processors, called.clone());
        let Invocation::PublishStatus { event_name, status } = &processed else {
            return Err(mismatch(Operation::PublishStatus, &processed));
        };

        let status_name = status_event_name(event_name);
        let matched = self
            .registry
            .borrow()
            .check(&status_name, "status-published", None)?;

        for name in matched {
            let key = self.registry.borrow().dispatch_key(&name);
            let envelope = EventEnvelope::new(key, Some(status.to_payload()));
            self.post_activity(
                Activity::new(Operation::PublishStatus.as_str(), EventSource::Portal)
                    .with_target(EventSource::Portal.as_str())
                    .with_event(&envelope.event_name)
                    .with_details(status),
            );
            self.emit(&envelope)?;
        }

        ProcessingPipeline::run_post(&self.processors, &called, &processed);
        Ok(())
    }

    /// Dispatches on the local document, then forwards across the boundary.
    fn emit(&self, envelope: &EventEnvelope) -> Result<()> {
        let document = self.context.document();
        let forwarder = self.forwarder();
        forwarder.deliver(envelope, document.as_ref(), EventSource::Portal)?;
        forwarder.forward(envelope)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Subscribing
    // ─────────────────────────────────────────────────────────────────────

    /// Subscribes `callback` to `event_name`.
    pub fn subscribe(&self, event_name: &str, callback: Listener) -> Result<()> {
        self.subscribe_with(event_name, callback, false)
    }

    /// Subscribes `callback` to `event_name`, optionally replaying the last
    /// retained envelope to it right away.
    pub fn subscribe_with(
        &self,
        event_name: &str,
        callback: Listener,
        last_published_data: bool,
    ) -> Result<()> {
        let called = Invocation::Subscribe {
            event_name: event_name.to_string(),
            callback,
        };
        let processed = ProcessingPipeline::run_pre(&self.processors, called.clone());
        let Invocation::Subscribe { event_name, callback } = &processed else {
            return Err(mismatch(Operation::Subscribe, &processed));
        };

        let matched = self.check_reporting(event_name, "subscribed")?;
        for name in matched {
            let key = self.registry.borrow().dispatch_key(&name);
            self.post_activity(
                Activity::new(Operation::Subscribe.as_str(), EventSource::Portal)
                    .with_target(EventSource::Portal.as_str())
                    .with_event(&key),
            );
            self.attach(&key, callback);

            if last_published_data {
                let retained = self.subscribers.borrow().retained(&key).cloned();
                if let Some(envelope) = retained {
                    callback(&envelope)?;
                }
            }
        }

        ProcessingPipeline::run_post(&self.processors, &called, &processed);
        Ok(())
    }

    /// Subscribes `callback` to `<name>/status`, enlisting the status event
    /// in the namespace of `name`. A newly public status event is announced
    /// across the boundary.
    pub fn subscribe_status(&self, event_name: &str, callback: Listener) -> Result<()> {
        let called = Invocation::SubscribeStatus {
            event_name: event_name.to_string(),
            callback,
        };
        let processed = ProcessingPipeline::run_pre(&self.processors, called.clone());
        let Invocation::SubscribeStatus { event_name, callback } = &processed else {
            return Err(mismatch(Operation::SubscribeStatus, &processed));
        };

        let matched = self.check_reporting(event_name, "status-subscribed")?;
        for name in matched {
            let status_name = status_event_name(&name);
            let private = self.registry.borrow().is_private(&name);

            let newly_public = if private {
                self.registry
                    .borrow_mut()
                    .enlist_private([status_name.clone()])?;
                false
            } else {
                !self
                    .registry
                    .borrow_mut()
                    .enlist_public([status_name.clone()])?
                    .is_empty()
            };
            if newly_public {
                self.forwarder().forward_public_catalog(EventSource::Portal)?;
            }

            let key = self.registry.borrow().dispatch_key(&status_name);
            self.post_activity(
                Activity::new(Operation::SubscribeStatus.as_str(), EventSource::Portal)
                    .with_target(EventSource::Portal.as_str())
                    .with_event(&key),
            );
            self.attach(&key, callback);
        }

        ProcessingPipeline::run_post(&self.processors, &called, &processed);
        Ok(())
    }

    fn attach(&self, key: &str, callback: &Listener) {
        self.subscribers.borrow_mut().add(key, Rc::clone(callback));
        self.context.add_listener(key, Rc::clone(callback));
        debug!(key = %key, "Subscriber and listener registered");
    }

    /// Removes every subscription of `event_name` and its native listeners.
    pub fn unsubscribe(&self, event_name: &str) -> Result<()> {
        let called = Invocation::Unsubscribe {
            event_name: event_name.to_string(),
        };
        let processed = ProcessingPipeline::run_pre(&self.processors, called.clone());
        let Invocation::Unsubscribe { event_name } = &processed else {
            return Err(mismatch(Operation::Unsubscribe, &processed));
        };

        let matched = self.check_reporting(event_name, "unsubscribed")?;
        let keys: Vec<String> = {
            let registry = self.registry.borrow();
            matched.iter().map(|name| registry.dispatch_key(name)).collect()
        };

        let removed = self.subscribers.borrow_mut().remove_by_keys(&keys);
        for subscription in removed {
            self.post_activity(
                Activity::new(Operation::Unsubscribe.as_str(), EventSource::Portal)
                    .with_target(EventSource::Portal.as_str())
                    .with_event(&subscription.key),
            );
            self.context
                .remove_listener(&subscription.key, &subscription.callback);
        }

        ProcessingPipeline::run_post(&self.processors, &called, &processed);
        Ok(())
    }

    /// Unsubscribes from `<name>/status`. Does nothing when the status event
    /// is not enlisted.
    pub fn unsubscribe_status(&self, event_name: &str) -> Result<()> {
        let called = Invocation::UnsubscribeStatus {
            event_name: event_name.to_string(),
        };
        let processed = ProcessingPipeline::run_pre(&self.processors, called.clone());
        let Invocation::UnsubscribeStatus { event_name } = &processed else {
            return Err(mismatch(Operation::UnsubscribeStatus, &processed));
        };

        let status_name = status_event_name(event_name);
        let matched = self
            .registry
            .borrow()
            .check(&status_name, "status-unsubscribed", None)?;
        for name in matched {
            self.post_activity(
                Activity::new(Operation::UnsubscribeStatus.as_str(), EventSource::Portal)
                    .with_target(EventSource::Portal.as_str())
                    .with_event(&name),
            );
            self.unsubscribe(&name)?;
        }

        ProcessingPipeline::run_post(&self.processors, &called, &processed);
        Ok(())
    }

    /// Drops every subscription and native listener, including the
    /// handshake listener.
    pub fn unsubscribe_all(&self) -> Result<()> {
        let called = Invocation::UnsubscribeAll;
        let processed = ProcessingPipeline::run_pre(&self.processors, called.clone());
        if !matches!(processed, Invocation::UnsubscribeAll) {
            return Err(mismatch(Operation::UnsubscribeAll, &processed));
        }

        let removed = self.subscribers.borrow_mut().clear();
        for subscription in removed {
            self.post_activity(
                Activity::new(Operation::UnsubscribeAll.as_str(), EventSource::Portal)
                    .with_target(EventSource::Portal.as_str())
                    .with_event(&subscription.key),
            );
            self.context
                .remove_listener(&subscription.key, &subscription.callback);
        }
        debug!("Unsubscribed all");

        ProcessingPipeline::run_post(&self.processors, &called, &processed);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registry surface
    // ─────────────────────────────────────────────────────────────────────

    pub fn is_event_registered(&self, event_name: &str) -> bool {
        self.registry.borrow().is_enlisted(event_name)
    }

    /// Enlists public events and announces the merged catalog across the
    /// boundary.
    pub fn register_public_events<I, S>(&self, event_names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let event_names: Vec<String> = event_names.into_iter().map(Into::into).collect();
        self.post_activity(
            Activity::new("registerPublicEvents", EventSource::Portal).with_details(&event_names),
        );
        self.registry.borrow_mut().enlist_public(event_names)?;
        self.forwarder().forward_public_catalog(EventSource::Portal)
    }

    /// Enlists private events. Private names never leave this context.
    pub fn register_private_events<I, S>(&self, event_names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post_activity(Activity::new("registerPrivateEvents", EventSource::Portal));
        self.registry.borrow_mut().enlist_private(event_names)?;
        Ok(())
    }

    /// Default and public event names.
    pub fn lookup_registered_event(&self) -> Vec<String> {
        self.registry.borrow().enlisted()
    }

    /// Token standing in for a private event name.
    pub fn resolve_token(&self, event_name: &str) -> Result<String> {
        self.registry.borrow().resolve_token(event_name)
    }

    /// Private event name behind a token, or the token itself.
    pub fn resolve_name(&self, token: &str) -> String {
        self.registry.borrow().resolve_name(token)
    }

    pub fn register_iframe_selectors<I, S>(&self, selectors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selectors: Vec<String> = selectors.into_iter().map(Into::into).collect();
        self.post_activity(
            Activity::new("registerIFrameSelectors", EventSource::Portal).with_details(&selectors),
        );
        self.frames.borrow_mut().register(selectors);
    }

    pub fn lookup_registered_iframe_selectors(&self) -> Vec<String> {
        self.frames.borrow().selectors().to_vec()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Processors, diagnostics, boundary
    // ─────────────────────────────────────────────────────────────────────

    pub fn add_pre_processors<I>(&self, processors: I)
    where
        I: IntoIterator<Item = (ProcessorTarget, PreProcessor)>,
    {
        self.processors.borrow_mut().add_pre_processors(processors);
    }

    pub fn add_post_processors<I>(&self, processors: I)
    where
        I: IntoIterator<Item = (ProcessorTarget, PostProcessor)>,
    {
        self.processors.borrow_mut().add_post_processors(processors);
    }

    /// Activity records ordered by timestamp.
    pub fn activities(&self) -> Vec<Activity> {
        self.activity.borrow().show_all()
    }

    /// Handshake progress of this context as a whole. An embedding context
    /// is `Synced` once any of its frames' catalogs has been merged.
    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.get()
    }

    /// Label of the browsing context this train lives in.
    pub fn context_label(&self) -> String {
        self.context.label()
    }

    /// Hands an inbound envelope to the subscribers of its event.
    ///
    /// Returns how many callbacks ran.
    pub fn dispatch(&self, envelope: &EventEnvelope) -> Result<usize> {
        debug!(
            event = %envelope.event_name,
            source = %envelope.event_source,
            "Inbound event"
        );
        SubscriberDirectory::dispatch(&self.subscribers, &self.registry, envelope)
    }

    /// Forwards an already-built envelope across the boundary.
    ///
    /// Fails with `PrivacyFault` when a raw private name would have to be
    /// posted to a cross-origin context.
    pub fn forward(&self, envelope: &EventEnvelope) -> Result<()> {
        self.forwarder().forward(envelope)
    }

    fn forwarder(&self) -> Forwarder<'_> {
        Forwarder {
            context: self.context.as_ref(),
            registry: &self.registry,
            frames: &self.frames,
            activity: &self.activity,
        }
    }

    fn post_activity(&self, activity: Activity) {
        self.activity.borrow_mut().post(activity);
    }

    /// Registry check that reports FAILED on `<name>/status` and fails with
    /// `AccessFault` for unknown names.
    fn check_reporting(&self, event_name: &str, action: &str) -> Result<Vec<String>> {
        let mut reported = Vec::new();
        let outcome = {
            let mut reporter =
                |name: &str, status: EventStatus| reported.push((name.to_string(), status));
            self.registry
                .borrow()
                .check(event_name, action, Some(&mut reporter))
        };

        for (name, status) in reported {
            if let Err(err) = self.publish_status(&name, status) {
                warn!(event = %name, error = %err, "Failed to publish status");
            }
        }
        outcome
    }
}

fn mismatch(expected: Operation, processed: &Invocation) -> Error {
    Error::HookMismatch {
        expected,
        found: processed.operation(),
    }
}
