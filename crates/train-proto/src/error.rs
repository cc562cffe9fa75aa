//! Error taxonomy shared across the bus.

use crate::Operation;

/// DOM exception code reported when a cross-origin context is touched.
pub const SAME_ORIGIN_CODE: u16 = 18;

/// DOM exception name reported when a cross-origin context is touched.
pub const SAME_ORIGIN_NAME: &str = "SecurityError";

/// Errors raised synchronously by bus operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A name was offered to one of Public/Private while already in the other.
    #[error("globalAccessFault: events already registered in the other namespace: {}", names.join(", "))]
    NamespaceConflict { names: Vec<String> },

    /// An operation referenced a name that is not enlisted anywhere.
    #[error("globalAccessFault: {action} event not recognised: {event_name}")]
    AccessFault { action: String, event_name: String },

    /// A private name was about to cross the frame boundary unresolved,
    /// or a token was requested for a name outside the private namespace.
    #[error("globalAccessFault: event is not allowed outside its scope: {event_name}")]
    PrivacyFault { event_name: String },

    /// A wagon was requested without a consumer name.
    #[error("globalInitFault: a micro app name is required to create a wagon")]
    InitFault,

    /// Native dispatch onto a browsing context failed.
    #[error("{name} (code {code:?}): {message}")]
    Dom {
        code: Option<u16>,
        name: String,
        message: String,
    },

    /// A pre-processor returned arguments for another operation.
    #[error("pre-processor for {expected} returned arguments for {found}")]
    HookMismatch { expected: Operation, found: Operation },

    /// A subscriber callback reported failure.
    #[error("subscriber failed: {0}")]
    Callback(String),

    /// Structured clone of a wire message failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Builds the error a host raises for cross-origin dispatch.
    pub fn same_origin_violation(message: impl Into<String>) -> Self {
        Self::Dom {
            code: Some(SAME_ORIGIN_CODE),
            name: SAME_ORIGIN_NAME.to_string(),
            message: message.into(),
        }
    }

    /// Returns true if this is the security restriction that triggers the
    /// message-passing fallback.
    pub fn is_same_origin_violation(&self) -> bool {
        match self {
            Self::Dom { code, name, .. } => {
                *code == Some(SAME_ORIGIN_CODE) || name == SAME_ORIGIN_NAME
            }
            _ => false,
        }
    }

    /// Wraps any displayable failure raised inside a subscriber.
    pub fn callback(err: impl std::fmt::Display) -> Self {
        Self::Callback(err.to_string())
    }
}

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_origin_detected_by_code_or_name() {
        assert!(Error::same_origin_violation("blocked").is_same_origin_violation());

        let by_code = Error::Dom {
            code: Some(18),
            name: "DOMException".to_string(),
            message: String::new(),
        };
        assert!(by_code.is_same_origin_violation());

        let by_name = Error::Dom {
            code: None,
            name: "SecurityError".to_string(),
            message: String::new(),
        };
        assert!(by_name.is_same_origin_violation());
    }

    #[test]
    fn test_other_dom_errors_not_same_origin() {
        let err = Error::Dom {
            code: Some(9),
            name: "NotSupportedError".to_string(),
            message: String::new(),
        };
        assert!(!err.is_same_origin_violation());
        assert!(!Error::InitFault.is_same_origin_violation());
    }

    #[test]
    fn test_namespace_conflict_lists_names() {
        let err = Error::NamespaceConflict {
            names: vec!["a/b/c".to_string(), "d/e/f".to_string()],
        };
        assert!(err.to_string().contains("a/b/c, d/e/f"));
    }
}
