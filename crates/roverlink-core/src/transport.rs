//! Transport abstraction for the base station link
//!
//! The engine talks to a bidirectional, message-oriented channel through
//! the [`Transport`] trait. Inbound traffic is delivered back to the engine
//! as calls (`transport_opened`, `frame_received`, ...) by whoever owns the
//! real connection, so the engine itself never blocks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of link carrying the session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Plain WebSocket (`ws://`)
    WebSocket,
    /// WebSocket over TLS (`wss://`)
    SecureWebSocket,
    /// In-process channel (tests, simulators)
    Memory,
}

impl TransportType {
    /// Infer the transport type from an endpoint URL
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("wss://") {
            Some(TransportType::SecureWebSocket)
        } else if url.starts_with("ws://") {
            Some(TransportType::WebSocket)
        } else if url.starts_with("memory://") {
            Some(TransportType::Memory)
        } else {
            None
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::WebSocket => write!(f, "ws"),
            TransportType::SecureWebSocket => write!(f, "wss"),
            TransportType::Memory => write!(f, "memory"),
        }
    }
}

/// A bidirectional, message-oriented channel
///
/// At most one `open` is in flight per engine. `send` on a transport that
/// is not open must fail rather than drop the frame.
pub trait Transport: Send {
    /// Begin opening a connection to `url`; completion is reported to the engine
    fn open(&mut self, url: &str) -> Result<(), TransportError>;

    /// Send one text frame
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close the connection (idempotent)
    fn close(&mut self);
}

/// Errors that can occur with transports
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Transport already running")]
    AlreadyRunning,

    #[error("Transport not running")]
    NotRunning,

    #[error("Failed to open transport: {0}")]
    OpenFailed(String),

    #[error("Failed to send frame: {0}")]
    SendFailed(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<TransportError> for String {
    fn from(err: TransportError) -> String {
        err.to_string()
    }
}

/// In-process transport that records traffic instead of sending it
///
/// `open` succeeds immediately from the transport's point of view; the
/// owner still has to tell the engine with `transport_opened`.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    open: bool,
    opened: Vec<String>,
    sent: Vec<String>,
    closes: usize,
    refuse_open: Option<String>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `open` fail with `reason`
    pub fn refuse_open(&mut self, reason: impl Into<String>) {
        self.refuse_open = Some(reason.into());
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// URLs passed to `open`, in order
    pub fn opened(&self) -> &[String] {
        &self.opened
    }

    /// Frames passed to `send`, in order
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Take the recorded frames, leaving the log empty
    pub fn drain_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }

    pub fn close_count(&self) -> usize {
        self.closes
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, url: &str) -> Result<(), TransportError> {
        if let Some(reason) = &self.refuse_open {
            return Err(TransportError::OpenFailed(reason.clone()));
        }
        if self.open {
            return Err(TransportError::AlreadyRunning);
        }
        self.opened.push(url.to_string());
        self.open = true;
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotRunning);
        }
        self.sent.push(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.closes += 1;
        }
    }
}
