//! Event Sink Trait
//!
//! The engine and its handlers report everything the operator should see
//! through [`EventSink`], so the same session logic can drive a terminal,
//! a GUI or a test recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

use crate::console::ConsoleLine;
use crate::protocol::MessageType;
use crate::state::SessionState;
use crate::telemetry::TelemetryUpdate;

/// Something that happened to a session, as opposed to data it carried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionNotice {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Authenticated {
        user: Option<String>,
    },
    AuthRejected,
    /// An inbound frame could not be decoded and was dropped
    DecodeFailed {
        error: String,
    },
    /// Valid data arrived in a state that does not accept it
    ProtocolViolation {
        state: SessionState,
        detail: String,
    },
    Unhandled {
        message_type: MessageType,
    },
    HandlerFailed {
        message_type: MessageType,
        cause: String,
    },
    ReconnectScheduled {
        attempt: u32,
        delay_ms: u64,
    },
    ShutDown,
}

impl fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionNotice::StateChanged { from, to } => write!(f, "state {from} -> {to}"),
            SessionNotice::Authenticated { user: Some(user) } => {
                write!(f, "authenticated as {user}")
            }
            SessionNotice::Authenticated { user: None } => write!(f, "authenticated"),
            SessionNotice::AuthRejected => write!(f, "authentication rejected"),
            SessionNotice::DecodeFailed { error } => write!(f, "dropped frame: {error}"),
            SessionNotice::ProtocolViolation { state, detail } => {
                write!(f, "protocol violation while {state}: {detail}")
            }
            SessionNotice::Unhandled { message_type } => {
                write!(f, "no handler for {message_type}")
            }
            SessionNotice::HandlerFailed {
                message_type,
                cause,
            } => write!(f, "{message_type} handler failed: {cause}"),
            SessionNotice::ReconnectScheduled { attempt, delay_ms } => {
                write!(f, "reconnect attempt {attempt} in {delay_ms} ms")
            }
            SessionNotice::ShutDown => write!(f, "session shut down"),
        }
    }
}

/// Event sink for presenting session output
///
/// Calls are made from the engine's single thread of control and must not
/// block for long.
pub trait EventSink: Send + Sync {
    /// A line was added to the console
    fn emit_console(&self, line: &ConsoleLine) -> Result<(), String>;

    /// A sensor sample was decoded
    fn emit_telemetry(&self, update: &TelemetryUpdate) -> Result<(), String>;

    /// A raw video frame arrived; payload is opaque
    fn emit_frame(&self, frame: &[u8]) -> Result<(), String>;

    fn emit_notice(&self, session_id: &str, notice: &SessionNotice) -> Result<(), String>;
}

/// No-op event sink for embedding without a frontend
#[derive(Debug, Default, Clone)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit_console(&self, _line: &ConsoleLine) -> Result<(), String> {
        Ok(())
    }

    fn emit_telemetry(&self, _update: &TelemetryUpdate) -> Result<(), String> {
        Ok(())
    }

    fn emit_frame(&self, _frame: &[u8]) -> Result<(), String> {
        Ok(())
    }

    fn emit_notice(&self, _session_id: &str, _notice: &SessionNotice) -> Result<(), String> {
        Ok(())
    }
}

/// Stdout event sink for CLI mode
#[derive(Debug, Default, Clone)]
pub struct StdoutEventSink {
    /// Whether to print in JSON format
    pub json_output: bool,
}

impl StdoutEventSink {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }
}

impl EventSink for StdoutEventSink {
    fn emit_console(&self, line: &ConsoleLine) -> Result<(), String> {
        if self.json_output {
            let json = serde_json::to_string(line).map_err(|e| e.to_string())?;
            println!(r#"{{"event":"console","line":{json}}}"#);
        } else {
            println!("[{}] {}", format_timestamp(line.timestamp), line);
        }
        Ok(())
    }

    fn emit_telemetry(&self, update: &TelemetryUpdate) -> Result<(), String> {
        if self.json_output {
            let json = serde_json::to_string(update).map_err(|e| e.to_string())?;
            println!(r#"{{"event":"telemetry","update":{json}}}"#);
        } else {
            println!(
                "[{}] ~ {}",
                format_timestamp(update.time),
                update.telemetry
            );
        }
        Ok(())
    }

    fn emit_frame(&self, frame: &[u8]) -> Result<(), String> {
        if self.json_output {
            println!(r#"{{"event":"video_frame","bytes":{}}}"#, frame.len());
        } else {
            // Too frequent for the text console.
            tracing::trace!(bytes = frame.len(), "Video frame");
        }
        Ok(())
    }

    fn emit_notice(&self, session_id: &str, notice: &SessionNotice) -> Result<(), String> {
        if self.json_output {
            let mut value = serde_json::to_value(notice).map_err(|e| e.to_string())?;
            if let Some(object) = value.as_object_mut() {
                object.insert("session_id".to_string(), session_id.into());
            }
            println!("{value}");
        } else {
            println!("[{}] * {}", format_timestamp(Utc::now()), notice);
        }
        Ok(())
    }
}

/// Everything a [`MemoryEventSink`] has seen
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Console(ConsoleLine),
    Telemetry(TelemetryUpdate),
    Frame(Vec<u8>),
    Notice(SessionNotice),
}

/// Sink that records events in memory, for tests and replay tooling
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded notices only, in order
    pub fn notices(&self) -> Vec<SessionNotice> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SinkEvent) -> Result<(), String> {
        self.events
            .lock()
            .map_err(|e| e.to_string())?
            .push(event);
        Ok(())
    }
}

impl EventSink for MemoryEventSink {
    fn emit_console(&self, line: &ConsoleLine) -> Result<(), String> {
        self.push(SinkEvent::Console(line.clone()))
    }

    fn emit_telemetry(&self, update: &TelemetryUpdate) -> Result<(), String> {
        self.push(SinkEvent::Telemetry(update.clone()))
    }

    fn emit_frame(&self, frame: &[u8]) -> Result<(), String> {
        self.push(SinkEvent::Frame(frame.to_vec()))
    }

    fn emit_notice(&self, _session_id: &str, notice: &SessionNotice) -> Result<(), String> {
        self.push(SinkEvent::Notice(notice.clone()))
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%H:%M:%S%.3f").to_string()
}
