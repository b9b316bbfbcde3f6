//! Error types for tdlink.
//!
//! Every failure the client core can report is a variant of [`TdError`]. None of
//! them is process-fatal: transport setup failures belong to whoever builds the
//! transport.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the tdlink client core.
#[derive(Debug, Error)]
pub enum TdError {
    // Handshake errors
    #[error("Not supported authorization state: {state}")]
    UnsupportedState { state: String },

    #[error("Authorization input closed: {input}")]
    InputClosed { input: &'static str },

    // Call errors
    #[error("Request timeout after {0:?}")]
    RequestTimeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Client is closed")]
    Closed,

    #[error("Engine error {code}: {message}")]
    Engine { code: i32, message: String },

    // Transport errors
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Decode errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Unknown type discriminant: {kind}")]
    UnknownDiscriminant { kind: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for tdlink operations.
pub type Result<T> = std::result::Result<T, TdError>;

impl From<std::io::Error> for TdError {
    fn from(err: std::io::Error) -> Self {
        TdError::Transport {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TdError {
    fn from(err: serde_json::Error) -> Self {
        TdError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl TdError {
    /// Create an unsupported-state error naming the state's discriminant.
    pub fn unsupported_state(state: impl Into<String>) -> Self {
        TdError::UnsupportedState {
            state: state.into(),
        }
    }

    /// Create a transport error without an underlying IO cause.
    pub fn transport(message: impl Into<String>) -> Self {
        TdError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error must abort an authorization handshake.
    pub fn is_unsupported_state(&self) -> bool {
        matches!(self, TdError::UnsupportedState { .. })
    }

    /// Whether a handshake driver should stop instead of retrying the state.
    pub fn ends_handshake(&self) -> bool {
        matches!(
            self,
            TdError::UnsupportedState { .. }
                | TdError::InputClosed { .. }
                | TdError::Closed
                | TdError::Cancelled
        )
    }

    /// Check if the failed call may succeed when issued again.
    ///
    /// Engine code 429 is the engine's own "too many requests" answer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TdError::RequestTimeout(_) | TdError::Transport { .. } | TdError::Engine { code: 429, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TdError::unsupported_state("authorizationStateWaitPassword");
        assert_eq!(
            err.to_string(),
            "Not supported authorization state: authorizationStateWaitPassword"
        );

        let err = TdError::Engine {
            code: 400,
            message: "PHONE_CODE_INVALID".into(),
        };
        assert_eq!(err.to_string(), "Engine error 400: PHONE_CODE_INVALID");
    }

    #[test]
    fn test_unsupported_state_predicate() {
        assert!(TdError::unsupported_state("x").is_unsupported_state());
        assert!(!TdError::Cancelled.is_unsupported_state());
    }

    #[test]
    fn test_handshake_ending_errors() {
        assert!(TdError::unsupported_state("x").ends_handshake());
        assert!(TdError::InputClosed { input: "code" }.ends_handshake());
        assert!(TdError::Closed.ends_handshake());
        assert!(!TdError::Engine {
            code: 400,
            message: "PHONE_CODE_INVALID".into()
        }
        .ends_handshake());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TdError::RequestTimeout(Duration::from_secs(5)).is_retryable());
        assert!(TdError::Engine {
            code: 429,
            message: "Too Many Requests".into()
        }
        .is_retryable());
        assert!(!TdError::Closed.is_retryable());
        assert!(!TdError::UnknownDiscriminant { kind: "foo".into() }.is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: TdError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, TdError::Json { source: Some(_), .. }));
    }
}
