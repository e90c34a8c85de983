//! Rover Protocol Types
//!
//! Core types for the JSON messages exchanged with the rover base station.
//! Every frame is a single JSON object discriminated by its `type` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Discriminant of a wire message (the value of its `type` field)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Auth,
    AuthResponse,
    Log,
    Command,
    CommandEnded,
    CommandStatus,
    Option,
    OptionResponse,
    SensorData,
    QueryBase,
    QueryBaseResponse,
    EStop,
}

impl MessageType {
    /// All recognized message types
    pub const ALL: [MessageType; 12] = [
        MessageType::Auth,
        MessageType::AuthResponse,
        MessageType::Log,
        MessageType::Command,
        MessageType::CommandEnded,
        MessageType::CommandStatus,
        MessageType::Option,
        MessageType::OptionResponse,
        MessageType::SensorData,
        MessageType::QueryBase,
        MessageType::QueryBaseResponse,
        MessageType::EStop,
    ];

    /// Wire tag for this type
    pub const fn tag(self) -> &'static str {
        match self {
            MessageType::Auth => "auth",
            MessageType::AuthResponse => "auth_response",
            MessageType::Log => "log",
            MessageType::Command => "command",
            MessageType::CommandEnded => "command_ended",
            MessageType::CommandStatus => "command_status",
            MessageType::Option => "option",
            MessageType::OptionResponse => "option_response",
            MessageType::SensorData => "sensor_data",
            MessageType::QueryBase => "query_base",
            MessageType::QueryBaseResponse => "query_base_response",
            MessageType::EStop => "e_stop",
        }
    }

    /// Look up a type by its wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Whether the client may originate this type
    pub const fn is_outbound(self) -> bool {
        matches!(
            self,
            MessageType::Auth
                | MessageType::Log
                | MessageType::Command
                | MessageType::Option
                | MessageType::QueryBase
                | MessageType::EStop
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A drive command understood by the rover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriveCommand {
    /// Travel `distance` at `speed`, turning `angle` degrees over the distance
    MoveDistance { distance: f64, speed: f64, angle: f64 },
    /// Drive until told otherwise at `speed`, turning at `angle`
    MoveContinuous { speed: f64, angle: f64 },
}

impl DriveCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            DriveCommand::MoveDistance { .. } => "move_distance",
            DriveCommand::MoveContinuous { .. } => "move_continuous",
        }
    }
}

impl fmt::Display for DriveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveCommand::MoveDistance {
                distance,
                speed,
                angle,
            } => write!(f, "move_distance({distance}, speed {speed}, angle {angle})"),
            DriveCommand::MoveContinuous { speed, angle } => {
                write!(f, "move_continuous(speed {speed}, angle {angle})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthMessage {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponseMessage {
    pub success: bool,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub message: String,
    pub level: String,
}

/// Sets (or clears, when `command` is `None`) the rover's current command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    #[serde(default)]
    pub command: Option<DriveCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEndedMessage {
    pub command: DriveCommand,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStatusMessage {
    #[serde(default)]
    pub command: Option<DriveCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionMessage {
    pub get: Vec<String>,
    pub set: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionResponseMessage {
    pub values: Map<String, Value>,
}

/// A sensor reading reported by the rover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDataMessage {
    /// Sample time in nanoseconds since UNIX_EPOCH
    pub time: i64,
    pub sensor: String,
    pub measurements: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBaseMessage {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBaseResponseMessage {
    pub query: String,
    pub value: Value,
}

/// A validated wire message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Auth(AuthMessage),
    AuthResponse(AuthResponseMessage),
    Log(LogMessage),
    Command(CommandMessage),
    CommandEnded(CommandEndedMessage),
    CommandStatus(CommandStatusMessage),
    Option(OptionMessage),
    OptionResponse(OptionResponseMessage),
    SensorData(SensorDataMessage),
    QueryBase(QueryBaseMessage),
    QueryBaseResponse(QueryBaseResponseMessage),
    EStop,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Auth(_) => MessageType::Auth,
            Message::AuthResponse(_) => MessageType::AuthResponse,
            Message::Log(_) => MessageType::Log,
            Message::Command(_) => MessageType::Command,
            Message::CommandEnded(_) => MessageType::CommandEnded,
            Message::CommandStatus(_) => MessageType::CommandStatus,
            Message::Option(_) => MessageType::Option,
            Message::OptionResponse(_) => MessageType::OptionResponse,
            Message::SensorData(_) => MessageType::SensorData,
            Message::QueryBase(_) => MessageType::QueryBase,
            Message::QueryBaseResponse(_) => MessageType::QueryBaseResponse,
            Message::EStop => MessageType::EStop,
        }
    }
}

/// Operator token used for the auth handshake
///
/// The token never appears in `Debug` output so it cannot leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// An outbound action that has not been serialized yet
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Auth { credential: Credential },
    Log { message: String, level: String },
    /// `None` clears the rover's current command
    Command { command: Option<DriveCommand> },
    EStop,
    QueryBase { query: String },
    Option { get: Vec<String>, set: Map<String, Value> },
}

impl Intent {
    pub fn auth(credential: Credential) -> Self {
        Intent::Auth { credential }
    }

    pub fn log(message: impl Into<String>, level: impl Into<String>) -> Self {
        Intent::Log {
            message: message.into(),
            level: level.into(),
        }
    }

    pub fn drive(distance: f64, speed: f64, angle: f64) -> Self {
        Intent::Command {
            command: Some(DriveCommand::MoveDistance {
                distance,
                speed,
                angle,
            }),
        }
    }

    pub fn drive_continuous(speed: f64, angle: f64) -> Self {
        Intent::Command {
            command: Some(DriveCommand::MoveContinuous { speed, angle }),
        }
    }

    pub fn query(query: impl Into<String>) -> Self {
        Intent::QueryBase {
            query: query.into(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Intent::Auth { .. } => MessageType::Auth,
            Intent::Log { .. } => MessageType::Log,
            Intent::Command { .. } => MessageType::Command,
            Intent::EStop => MessageType::EStop,
            Intent::QueryBase { .. } => MessageType::QueryBase,
            Intent::Option { .. } => MessageType::Option,
        }
    }

    /// Convert into the wire message this intent produces
    pub fn into_message(self) -> Message {
        match self {
            Intent::Auth { credential } => Message::Auth(AuthMessage {
                token: credential.0,
            }),
            Intent::Log { message, level } => Message::Log(LogMessage { message, level }),
            Intent::Command { command } => Message::Command(CommandMessage { command }),
            Intent::EStop => Message::EStop,
            Intent::QueryBase { query } => Message::QueryBase(QueryBaseMessage { query }),
            Intent::Option { get, set } => Message::Option(OptionMessage { get, set }),
        }
    }
}
