//! # train-core
//!
//! The Event Train bus: a synchronous publish/subscribe hub for micro front
//! ends that also carries events across embedded frames.
//!
//! This crate provides:
//! - The event registry with Default, Public and Private namespaces
//! - The subscriber directory and inbound dispatch
//! - Pre/post processing hooks around every public operation
//! - Frame forwarding and the public catalog handshake
//! - Named wagons sharing one bus
//! - An in-memory host for tests and simulations

mod activity;
mod config;
mod context;
mod forwarding;
mod frames;
mod processors;
mod registry;
mod subscribers;
mod train;
mod wagon;
pub mod testing;

pub use activity::{Activity, ActivityLog};
pub use config::{ConfigError, ConfigWarning, LogLevel, LoggingConfig, TrainConfig};
pub use context::{BrowsingContext, DeliveryTarget, Listener, MessageListener, same_listener};
pub use forwarding::{Forwarder, HandshakeState, catalog_from_payload};
pub use frames::{DEFAULT_FRAME_SELECTORS, FrameInventory};
pub use processors::{
    EventData, Invocation, PostProcessor, PreProcessor, ProcessingPipeline, ProcessorTarget,
};
pub use registry::{DEFAULT_EVENTS, EventRegistry};
pub use subscribers::{SubscriberDirectory, Subscription};
pub use train::Train;
pub use wagon::{Wagon, WagonRecord};
