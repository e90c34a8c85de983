//! Client-wide error types
//!
//! Centralized error type for operations callers perform on a session.
//! Component-level failures (decode, dispatch, transitions) keep their own
//! types and convert into [`ClientError`] where they cross the engine API.

use thiserror::Error;

use crate::state::IllegalTransition;
use crate::transport::TransportError;

/// Client-wide error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// A non-auth intent was sent before the handshake completed
    #[error("Session is not authenticated")]
    NotAuthenticated,

    /// The engine was shut down and cannot be restarted
    #[error("Session has been shut down")]
    ShutDown,

    /// A lifecycle event arrived in a state that does not accept it
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// The transport refused an operation
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert ClientError to String for display boundaries
impl From<ClientError> for String {
    fn from(error: ClientError) -> String {
        error.to_string()
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SessionState, StateEvent};

    #[test]
    fn test_error_display() {
        assert_eq!(
            ClientError::NotAuthenticated.to_string(),
            "Session is not authenticated"
        );

        let err: ClientError = IllegalTransition {
            from: SessionState::Connecting,
            event: StateEvent::Connect,
        }
        .into();
        assert_eq!(err.to_string(), "Illegal transition: connect while connecting");

        let text: String = ClientError::Config("bad port".to_string()).into();
        assert_eq!(text, "Configuration error: bad port");
    }

    #[test]
    fn test_from_transport_error() {
        let err: ClientError = TransportError::NotRunning.into();
        assert!(matches!(err, ClientError::Transport(TransportError::NotRunning)));
    }
}
