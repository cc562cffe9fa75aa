//! # train-proto
//!
//! Shared types and error definitions for the Event Train bus.
//!
//! This crate provides the foundational vocabulary used by every Event Train
//! crate, including:
//! - The canonical event envelope and its cross-frame wire form
//! - Event source roles and status values
//! - Namespace classification of event names
//! - Operation kinds wrapped by the processing pipeline
//! - The shared error taxonomy

mod envelope;
mod error;
mod namespace;
mod operation;
mod status;

pub use envelope::{EventEnvelope, EventSource, SYSTEM_IFRAME_INIT, WireMessage, timestamp};
pub use error::{Error, Result};
pub use namespace::{DELIMITERS, Namespace, follows_convention};
pub use operation::Operation;
pub use status::{EventStatus, STATUS_SUFFIX, status_event_name};
