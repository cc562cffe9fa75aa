//! Namespace classification of event names.

use serde::{Deserialize, Serialize};

/// Segment delimiters of the `scope/app/section/action` naming convention.
pub const DELIMITERS: [char; 3] = ['/', '-', '.'];

/// The namespace an enlisted event name belongs to.
///
/// Public and Private are mutually exclusive. Default names are seeded at
/// bootstrap and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Default,
    Public,
    Private,
}

impl Namespace {
    /// Returns true if names in this namespace may travel across frames raw.
    pub fn crosses_boundary_raw(self) -> bool {
        !matches!(self, Namespace::Private)
    }
}

/// Returns true if `event_name` has at least two non-empty segments.
pub fn follows_convention(event_name: &str) -> bool {
    let segments = event_name
        .split(DELIMITERS)
        .filter(|segment| !segment.is_empty())
        .count();
    segments >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convention_accepts_any_delimiter() {
        assert!(follows_convention("global/web/error/404"));
        assert!(follows_convention("cart-item-added"));
        assert!(follows_convention("cart.item.added"));
    }

    #[test]
    fn test_convention_rejects_single_segment() {
        assert!(!follows_convention("checkout"));
        assert!(!follows_convention("checkout/"));
        assert!(!follows_convention(""));
    }

    #[test]
    fn test_only_private_stays_home() {
        assert!(Namespace::Default.crosses_boundary_raw());
        assert!(Namespace::Public.crosses_boundary_raw());
        assert!(!Namespace::Private.crosses_boundary_raw());
    }
}
