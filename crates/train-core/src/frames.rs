//! Selectors used to find embedded frames in the embedding document.

use tracing::debug;

/// Selectors every embedding document starts with.
pub const DEFAULT_FRAME_SELECTORS: [&str; 2] = ["global-micro-page-iFramed", "global-macro-page-Framed"];

/// Deduplicated, insertion-ordered frame selectors.
#[derive(Debug, Clone)]
pub struct FrameInventory {
    selectors: Vec<String>,
}

impl Default for FrameInventory {
    fn default() -> Self {
        let mut inventory = Self {
            selectors: Vec::new(),
        };
        inventory.register(DEFAULT_FRAME_SELECTORS);
        inventory
    }
}

impl FrameInventory {
    /// Creates an inventory holding [`DEFAULT_FRAME_SELECTORS`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds selectors, ignoring empty and already known ones.
    pub fn register<I, S>(&mut self, selectors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for selector in selectors {
            let selector = selector.into();
            if !selector.is_empty() && !self.selectors.contains(&selector) {
                self.selectors.push(selector);
            }
        }
        debug!(selectors = ?self.selectors, "Frame selectors registered");
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }
}
