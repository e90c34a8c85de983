//! Roverlink Core Library
//!
//! Client-side session engine for driving a rover through its base
//! station. This crate provides the protocol types, the wire codec, the
//! connection/auth state machine, message dispatch and the reconnect
//! policy, independent of any frontend.
//!
//! # Modules
//!
//! - [`protocol`] - Wire message types, intents and credentials
//! - [`codec`] - JSON encoding and validated decoding
//! - [`state`] - Connection/auth state machine
//! - [`dispatcher`] - Per-type handler table for inbound messages
//! - [`reconnect`] - Fixed-delay reconnect policy
//! - [`engine`] - The session engine tying the above together
//! - [`transport`] - Transport trait and in-memory transport
//! - [`events`] - Event sink trait for decoupling from frontends
//! - [`console`] - Operator console buffer
//! - [`telemetry`] - Typed telemetry from sensor data
//! - [`handlers`] - Default handler table
//! - [`config`] - Client configuration
//! - [`runtime`] - WebSocket runtime (feature `websocket`)
//! - [`error`] - Error types

pub mod codec;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod protocol;
pub mod reconnect;
#[cfg(feature = "websocket")]
pub mod runtime;
pub mod state;
pub mod telemetry;
pub mod transport;

// Re-export commonly used types
pub use codec::DecodeError;
pub use config::ClientConfig;
pub use console::{Console, ConsoleLine, LogLevel};
pub use dispatcher::{DispatchError, Dispatcher, HandlerTable};
pub use engine::{PendingReconnect, ReconnectTicket, SessionEngine, SessionStatus};
pub use error::{ClientError, Result};
pub use events::{EventSink, NoOpEventSink, SessionNotice, StdoutEventSink};
pub use protocol::{Credential, DriveCommand, Intent, Message, MessageType};
pub use reconnect::ReconnectPolicy;
#[cfg(feature = "websocket")]
pub use runtime::{ChannelTransport, SessionHandle, SessionRuntime};
pub use state::{IllegalTransition, SessionState};
pub use telemetry::{Telemetry, TelemetryUpdate};
pub use transport::{MemoryTransport, Transport, TransportError, TransportType};
