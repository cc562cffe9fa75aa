//! Operation kinds of the public facade.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A facade operation wrapped by the pre/post processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Publish,
    PublishStatus,
    Subscribe,
    SubscribeStatus,
    Unsubscribe,
    UnsubscribeStatus,
    UnsubscribeAll,
}

impl Operation {
    /// Every operation kind, in declaration order.
    pub const ALL: [Operation; 7] = [
        Operation::Publish,
        Operation::PublishStatus,
        Operation::Subscribe,
        Operation::SubscribeStatus,
        Operation::Unsubscribe,
        Operation::UnsubscribeStatus,
        Operation::UnsubscribeAll,
    ];

    /// Returns the camelCase name used in logs and activity records.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Publish => "publish",
            Operation::PublishStatus => "publishStatus",
            Operation::Subscribe => "subscribe",
            Operation::SubscribeStatus => "subscribeStatus",
            Operation::Unsubscribe => "unsubscribe",
            Operation::UnsubscribeStatus => "unsubscribeStatus",
            Operation::UnsubscribeAll => "unsubscribeAll",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
