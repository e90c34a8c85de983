//! Session engine
//!
//! Owns one operator session: the transport, the connection/auth state,
//! the reconnect policy and the frozen dispatcher. The engine performs no
//! IO of its own and never waits. Whoever owns the real connection feeds
//! it events (`transport_opened`, `frame_received`, ...) one at a time and
//! arms a timer whenever [`SessionEngine::pending_reconnect`] changes.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::codec::{self, DecodeError};
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::error::{ClientError, Result};
use crate::events::{EventSink, SessionNotice};
use crate::protocol::{Credential, Intent, Message};
use crate::reconnect::ReconnectPolicy;
use crate::state::{IllegalTransition, SessionState, SessionStateMachine, StateEvent};
use crate::transport::{Transport, TransportError, TransportType};

/// Identifies one scheduled reconnect
///
/// A timer must hand its ticket back to
/// [`SessionEngine::reconnect_timer_fired`]; tickets that are no longer
/// pending are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReconnectTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReconnect {
    pub ticket: ReconnectTicket,
    pub delay: Duration,
    pub attempt: u32,
}

/// Point-in-time view of a session for status displays
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub url: String,
    pub state: SessionState,
    pub user: Option<String>,
    /// Attempt number of the reconnect currently scheduled, if any
    pub reconnect_attempt: Option<u32>,
}

pub struct SessionEngine<T: Transport> {
    session_id: String,
    url: String,
    transport: T,
    state: SessionStateMachine,
    reconnect: ReconnectPolicy,
    dispatcher: Dispatcher,
    sink: Arc<dyn EventSink>,
    credential: Option<Credential>,
    user: Option<String>,
    pending: Option<PendingReconnect>,
    next_ticket: u64,
    shut_down: bool,
}

impl<T: Transport> SessionEngine<T> {
    pub fn new(
        url: impl Into<String>,
        transport: T,
        dispatcher: Dispatcher,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            transport,
            state: SessionStateMachine::new(),
            reconnect: ReconnectPolicy::default(),
            dispatcher,
            sink,
            credential: None,
            user: None,
            pending: None,
            next_ticket: 0,
            shut_down: false,
        }
    }

    /// Builder method for the reconnect policy
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    /// User name the base station reported on the last successful auth
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn pending_reconnect(&self) -> Option<PendingReconnect> {
        self.pending
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.session_id.clone(),
            url: self.url.clone(),
            state: self.state(),
            user: self.user.clone(),
            reconnect_attempt: self.pending.map(|p| p.attempt),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Begin a session with `credential`
    ///
    /// From `AwaitingAuth` this replaces the credential and retries the
    /// handshake on the already open transport.
    pub fn start(&mut self, credential: Credential) -> Result<()> {
        if self.shut_down {
            return Err(ClientError::ShutDown);
        }

        match self.state() {
            SessionState::Disconnected => {
                self.credential = Some(credential);
                self.pending = None;
                self.connect()
            }
            SessionState::AwaitingAuth => {
                info!(session_id = %self.session_id, "Retrying authentication");
                self.credential = Some(credential);
                self.send_auth()
            }
            from => {
                let err = IllegalTransition {
                    from,
                    event: StateEvent::Connect,
                };
                error!(session_id = %self.session_id, "{}", err);
                Err(err.into())
            }
        }
    }

    /// The transport finished opening
    pub fn transport_opened(&mut self) -> Result<()> {
        if self.shut_down {
            debug!(session_id = %self.session_id, "Ignoring open after shutdown");
            return Ok(());
        }
        self.transition(StateEvent::TransportOpen)?;
        self.send_auth()
    }

    /// Handle one inbound text frame
    pub fn frame_received(&mut self, text: &str) {
        if self.shut_down {
            return;
        }

        let message = match codec::decode(text) {
            Ok(message) => message,
            Err(e) => {
                self.decode_failed(e);
                return;
            }
        };

        match (self.state(), message) {
            (SessionState::AwaitingAuth, Message::AuthResponse(response)) => {
                if response.success {
                    self.authenticated(response.user);
                } else {
                    self.auth_rejected();
                }
            }
            (SessionState::Authenticated, message) => self.dispatch(&message),
            (state, message) => self.violation(
                state,
                format!("unexpected {} message", message.message_type()),
            ),
        }
    }

    /// Handle one inbound binary frame (video)
    pub fn binary_received(&mut self, frame: &[u8]) {
        if self.shut_down {
            return;
        }
        match self.state() {
            SessionState::Authenticated => {
                if let Err(e) = self.sink.emit_frame(frame) {
                    warn!("Failed to emit video frame: {}", e);
                }
            }
            state => self.violation(
                state,
                format!("unexpected binary frame ({} bytes)", frame.len()),
            ),
        }
    }

    pub fn transport_closed(&mut self) {
        self.disconnected(StateEvent::TransportClosed, None);
    }

    pub fn transport_error(&mut self, reason: &str) {
        self.disconnected(StateEvent::TransportError, Some(reason));
    }

    /// Send an operator intent
    ///
    /// Everything except `auth` requires an authenticated session and is
    /// refused without touching the transport otherwise.
    pub fn send_intent(&mut self, intent: Intent) -> Result<()> {
        if self.shut_down {
            return Err(ClientError::ShutDown);
        }
        if !matches!(intent, Intent::Auth { .. }) && self.state() != SessionState::Authenticated {
            return Err(ClientError::NotAuthenticated);
        }

        let message_type = intent.message_type();
        self.transport.send(&codec::encode(intent))?;
        debug!(session_id = %self.session_id, message_type = %message_type, "Sent intent");
        Ok(())
    }

    /// Stop the session for good
    ///
    /// Cancels any pending reconnect and closes the transport. The engine
    /// refuses further `start` and `send_intent` calls afterwards.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.pending = None;
        self.reconnect.cancel();
        self.credential = None;
        self.transport.close();

        if self.state() != SessionState::Disconnected {
            let _ = self.transition(StateEvent::TransportClosed);
        }
        info!(session_id = %self.session_id, "Session shut down");
        self.notify(SessionNotice::ShutDown);
    }

    /// A reconnect timer expired
    ///
    /// Returns whether a new connection attempt was made.
    pub fn reconnect_timer_fired(&mut self, ticket: ReconnectTicket) -> Result<bool> {
        if self.shut_down {
            debug!(session_id = %self.session_id, "Ignoring reconnect timer after shutdown");
            return Ok(false);
        }
        match self.pending {
            Some(pending) if pending.ticket == ticket => {}
            _ => {
                debug!(session_id = %self.session_id, "Ignoring stale reconnect timer");
                return Ok(false);
            }
        }

        self.pending = None;
        if self.state() != SessionState::Disconnected {
            return Ok(false);
        }

        info!(session_id = %self.session_id, "Reconnecting to {}", self.url);
        self.connect()?;
        Ok(true)
    }

    fn connect(&mut self) -> Result<()> {
        let kind = TransportType::from_url(&self.url)
            .ok_or_else(|| TransportError::InvalidUrl(self.url.clone()))?;
        self.transition(StateEvent::Connect)?;
        info!(session_id = %self.session_id, transport = %kind, "Connecting to {}", self.url);

        if let Err(e) = self.transport.open(&self.url) {
            error!(session_id = %self.session_id, "Failed to open transport: {}", e);
            self.disconnected(StateEvent::TransportError, Some(&e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    fn send_auth(&mut self) -> Result<()> {
        let Some(credential) = self.credential.clone() else {
            warn!(session_id = %self.session_id, "No credential to authenticate with");
            return Ok(());
        };
        debug!(session_id = %self.session_id, "Sending auth");
        self.transport.send(&codec::encode(Intent::auth(credential)))?;
        Ok(())
    }

    fn authenticated(&mut self, user: Option<String>) {
        if self.transition(StateEvent::AuthSuccess).is_err() {
            return;
        }
        self.reconnect.on_connected();
        self.pending = None;
        info!(
            session_id = %self.session_id,
            user = user.as_deref().unwrap_or("-"),
            "Authenticated"
        );
        self.user = user.clone();
        self.notify(SessionNotice::Authenticated { user });
    }

    fn auth_rejected(&mut self) {
        if self.transition(StateEvent::AuthFailure).is_err() {
            return;
        }
        warn!(session_id = %self.session_id, "Authentication rejected");
        self.notify(SessionNotice::AuthRejected);
    }

    fn dispatch(&mut self, message: &Message) {
        match self.dispatcher.dispatch(message) {
            Ok(()) => {}
            Err(DispatchError::UnhandledMessageType(message_type)) => {
                debug!(session_id = %self.session_id, %message_type, "No handler bound");
                self.notify(SessionNotice::Unhandled { message_type });
            }
            Err(DispatchError::HandlerError {
                message_type,
                cause,
            }) => {
                warn!(session_id = %self.session_id, %message_type, "Handler failed: {}", cause);
                self.notify(SessionNotice::HandlerFailed {
                    message_type,
                    cause,
                });
            }
            Err(e @ DispatchError::DuplicateHandler(_)) => {
                error!(session_id = %self.session_id, "{}", e);
            }
        }
    }

    fn disconnected(&mut self, event: StateEvent, reason: Option<&str>) {
        if self.shut_down {
            return;
        }
        let was = self.state();
        match reason {
            Some(reason) => {
                warn!(session_id = %self.session_id, state = %was, "Transport error: {}", reason)
            }
            None => info!(session_id = %self.session_id, state = %was, "Transport closed"),
        }
        if self.transition(event).is_err() || was == SessionState::Disconnected {
            return;
        }

        match self.reconnect.on_disconnect() {
            Some(delay) => {
                self.next_ticket += 1;
                let attempt = self.reconnect.attempt().map_or(1, |a| a.attempt_count);
                self.pending = Some(PendingReconnect {
                    ticket: ReconnectTicket(self.next_ticket),
                    delay,
                    attempt,
                });
                info!(
                    session_id = %self.session_id,
                    attempt,
                    "Reconnecting in {} ms",
                    delay.as_millis()
                );
                self.notify(SessionNotice::ReconnectScheduled {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            None => {
                debug!(session_id = %self.session_id, "Not reconnecting");
            }
        }
    }

    fn decode_failed(&self, error: DecodeError) {
        warn!(session_id = %self.session_id, "Dropping frame: {}", error);
        self.notify(SessionNotice::DecodeFailed {
            error: error.to_string(),
        });
    }

    fn violation(&self, state: SessionState, detail: String) {
        warn!(session_id = %self.session_id, %state, "Protocol violation: {}", detail);
        self.notify(SessionNotice::ProtocolViolation { state, detail });
    }

    fn transition(
        &mut self,
        event: StateEvent,
    ) -> std::result::Result<SessionState, IllegalTransition> {
        let from = self.state();
        match self.state.transition(event) {
            Ok(to) => {
                if from != to {
                    debug!(session_id = %self.session_id, "State {} -> {}", from, to);
                    self.notify(SessionNotice::StateChanged { from, to });
                }
                Ok(to)
            }
            Err(e) => {
                error!(session_id = %self.session_id, "{}", e);
                Err(e)
            }
        }
    }

    fn notify(&self, notice: SessionNotice) {
        if let Err(e) = self.sink.emit_notice(&self.session_id, &notice) {
            warn!("Failed to emit session notice: {}", e);
        }
    }
}
