//! Session state machine
//!
//! Tracks the connection/auth lifecycle of one session and rejects any
//! transition not in the table below without touching the current state.
//!
//! ```text
//! Disconnected --connect-------> Connecting
//! Connecting   --transport_open-> AwaitingAuth
//! AwaitingAuth --auth_success---> Authenticated
//! AwaitingAuth --auth_failure---> AwaitingAuth
//! *            --transport_closed / transport_error--> Disconnected
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection/auth state of a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingAuth,
    Authenticated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::AwaitingAuth => write!(f, "awaiting_auth"),
            SessionState::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Events that drive the state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateEvent {
    Connect,
    TransportOpen,
    AuthSuccess,
    AuthFailure,
    TransportClosed,
    TransportError,
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateEvent::Connect => write!(f, "connect"),
            StateEvent::TransportOpen => write!(f, "transport_open"),
            StateEvent::AuthSuccess => write!(f, "auth_success"),
            StateEvent::AuthFailure => write!(f, "auth_failure"),
            StateEvent::TransportClosed => write!(f, "transport_closed"),
            StateEvent::TransportError => write!(f, "transport_error"),
        }
    }
}

/// A transition that the table does not allow
///
/// Seeing this in correct operation means a collaborator delivered events
/// out of order; it is a defect signal, not a recoverable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Illegal transition: {event} while {from}")]
pub struct IllegalTransition {
    pub from: SessionState,
    pub event: StateEvent,
}

/// Holder of the current [`SessionState`]
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    current: SessionState,
    ever_authenticated: bool,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> SessionState {
        self.current
    }

    /// Whether this session reached `Authenticated` at least once
    pub fn ever_authenticated(&self) -> bool {
        self.ever_authenticated
    }

    /// Apply an event, returning the new state
    pub fn transition(&mut self, event: StateEvent) -> Result<SessionState, IllegalTransition> {
        use SessionState::*;
        use StateEvent::*;

        let next = match (self.current, event) {
            (_, TransportClosed | TransportError) => Disconnected,
            (Disconnected, Connect) => Connecting,
            (Connecting, TransportOpen) => AwaitingAuth,
            (AwaitingAuth, AuthSuccess) => Authenticated,
            (AwaitingAuth, AuthFailure) => AwaitingAuth,
            (from, event) => return Err(IllegalTransition { from, event }),
        };

        if next == Authenticated {
            self.ever_authenticated = true;
        }
        self.current = next;
        Ok(next)
    }
}
