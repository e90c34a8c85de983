//! Message codec
//!
//! Encodes outbound intents to wire text and decodes inbound frames into
//! typed [`Message`]s. Decoding validates each variant against an explicit
//! field schema before the typed value is built, so a message that reaches
//! the dispatcher always has every field its handler relies on.
//!
//! Validation is structural only: ranges and units are never inspected.

use serde_json::{Map, Value};

use crate::protocol::{Intent, Message, MessageType};

/// Reasons an inbound frame is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Schema violation in {message_type} message: field '{field}'")]
    SchemaViolation {
        message_type: MessageType,
        field: String,
    },
}

/// Semantic type a field must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Bool,
    Integer,
    Number,
    Object,
    TextList,
    /// Any JSON value, including null, as long as the key is present
    Any,
    DriveCommand,
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    /// Optional fields may be absent or null
    optional: bool,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        optional: false,
    }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        optional: true,
    }
}

const AUTH: &[FieldSpec] = &[required("token", FieldKind::Text)];
const AUTH_RESPONSE: &[FieldSpec] = &[
    required("success", FieldKind::Bool),
    optional("user", FieldKind::Text),
];
const LOG: &[FieldSpec] = &[
    required("message", FieldKind::Text),
    required("level", FieldKind::Text),
];
const COMMAND: &[FieldSpec] = &[optional("command", FieldKind::DriveCommand)];
const COMMAND_ENDED: &[FieldSpec] = &[
    required("command", FieldKind::DriveCommand),
    required("completed", FieldKind::Bool),
];
const OPTION: &[FieldSpec] = &[
    required("get", FieldKind::TextList),
    required("set", FieldKind::Object),
];
const OPTION_RESPONSE: &[FieldSpec] = &[required("values", FieldKind::Object)];
const SENSOR_DATA: &[FieldSpec] = &[
    required("time", FieldKind::Integer),
    required("sensor", FieldKind::Text),
    required("measurements", FieldKind::Object),
];
const QUERY_BASE: &[FieldSpec] = &[required("query", FieldKind::Text)];
const QUERY_BASE_RESPONSE: &[FieldSpec] = &[
    required("query", FieldKind::Text),
    required("value", FieldKind::Any),
];

const MOVE_DISTANCE: &[FieldSpec] = &[
    required("distance", FieldKind::Number),
    required("speed", FieldKind::Number),
    required("angle", FieldKind::Number),
];
const MOVE_CONTINUOUS: &[FieldSpec] = &[
    required("speed", FieldKind::Number),
    required("angle", FieldKind::Number),
];

/// Field schema of each message variant
fn schema(message_type: MessageType) -> &'static [FieldSpec] {
    match message_type {
        MessageType::Auth => AUTH,
        MessageType::AuthResponse => AUTH_RESPONSE,
        MessageType::Log => LOG,
        MessageType::Command | MessageType::CommandStatus => COMMAND,
        MessageType::CommandEnded => COMMAND_ENDED,
        MessageType::Option => OPTION,
        MessageType::OptionResponse => OPTION_RESPONSE,
        MessageType::SensorData => SENSOR_DATA,
        MessageType::QueryBase => QUERY_BASE,
        MessageType::QueryBaseResponse => QUERY_BASE_RESPONSE,
        MessageType::EStop => &[],
    }
}

/// Field schema of each drive command shape, keyed by its `type` tag
fn drive_command_schema(kind: &str) -> Option<&'static [FieldSpec]> {
    match kind {
        "move_distance" => Some(MOVE_DISTANCE),
        "move_continuous" => Some(MOVE_CONTINUOUS),
        _ => None,
    }
}

/// Serialize an intent to wire text
pub fn encode(intent: Intent) -> String {
    encode_message(&intent.into_message())
}

/// Serialize a message to wire text
pub fn encode_message(message: &Message) -> String {
    // Every payload type is plain data with string keys, so this cannot fail.
    serde_json::to_string(message).unwrap_or_default()
}

/// Parse and validate one inbound frame
pub fn decode(text: &str) -> Result<Message, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::MalformedPayload("expected a JSON object".to_string()))?;

    let message_type = match object.get("type") {
        None => return Err(DecodeError::MissingField("type".to_string())),
        Some(Value::String(tag)) => {
            MessageType::from_tag(tag).ok_or_else(|| DecodeError::UnknownType(tag.clone()))?
        }
        Some(other) => return Err(DecodeError::UnknownType(other.to_string())),
    };

    validate_fields(message_type, object, schema(message_type), "")?;

    serde_json::from_value(value).map_err(|e| {
        // Unreachable once the schema passed, but never let it escape as a panic.
        tracing::warn!("Validated {} message failed to build: {}", message_type, e);
        DecodeError::SchemaViolation {
            message_type,
            field: "type".to_string(),
        }
    })
}

fn validate_fields(
    message_type: MessageType,
    object: &Map<String, Value>,
    fields: &[FieldSpec],
    prefix: &str,
) -> Result<(), DecodeError> {
    for spec in fields {
        let path = format!("{prefix}{}", spec.name);
        let violation = || DecodeError::SchemaViolation {
            message_type,
            field: path.clone(),
        };

        let value = match object.get(spec.name) {
            None if spec.optional => continue,
            None => return Err(violation()),
            Some(Value::Null) if spec.optional || spec.kind == FieldKind::Any => continue,
            Some(value) => value,
        };

        let ok = match spec.kind {
            FieldKind::Text => value.is_string(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Integer => value.is_i64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Object => value.is_object(),
            FieldKind::TextList => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
            FieldKind::Any => true,
            FieldKind::DriveCommand => {
                validate_drive_command(message_type, value, &path)?;
                true
            }
        };

        if !ok {
            return Err(violation());
        }
    }

    Ok(())
}

fn validate_drive_command(
    message_type: MessageType,
    value: &Value,
    path: &str,
) -> Result<(), DecodeError> {
    let object = value.as_object().ok_or_else(|| DecodeError::SchemaViolation {
        message_type,
        field: path.to_string(),
    })?;

    let fields = object
        .get("type")
        .and_then(Value::as_str)
        .and_then(drive_command_schema)
        .ok_or_else(|| DecodeError::SchemaViolation {
            message_type,
            field: format!("{path}.type"),
        })?;

    validate_fields(message_type, object, fields, &format!("{path}."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Credential, DriveCommand};
    use serde_json::json;

    fn violation(message_type: MessageType, field: &str) -> DecodeError {
        DecodeError::SchemaViolation {
            message_type,
            field: field.to_string(),
        }
    }

    #[test]
    fn test_round_trip_outbound_intents() {
        let mut set = Map::new();
        set.insert("camera.framerate".to_string(), json!(15));

        let intents = vec![
            Intent::auth(Credential::new("tok123")),
            Intent::log("hello base", "warning"),
            Intent::drive(2.5, 1.0, -30.0),
            Intent::drive_continuous(0.5, 10.0),
            Intent::Command { command: None },
            Intent::EStop,
            Intent::query("rover_position"),
            Intent::Option {
                get: vec!["camera.source".to_string()],
                set,
            },
        ];

        for intent in intents {
            let expected = intent.clone().into_message();
            let wire = encode(intent);
            assert_eq!(decode(&wire).unwrap(), expected, "wire: {wire}");
        }
    }

    #[test]
    fn test_encode_auth_shape() {
        let wire = encode(Intent::auth(Credential::new("tok123")));
        let value: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value, json!({"type": "auth", "token": "tok123"}));
    }

    #[test]
    fn test_missing_type() {
        for text in [r#"{}"#, r#"{"message":"hi","level":"info"}"#, r#"{"Type":"log"}"#] {
            assert_eq!(
                decode(text),
                Err(DecodeError::MissingField("type".to_string()))
            );
        }
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            decode("{not json"),
            Err(DecodeError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode("[1, 2, 3]"),
            Err(DecodeError::MalformedPayload(_))
        ));
        assert!(matches!(decode(""), Err(DecodeError::MalformedPayload(_))));
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            decode(r#"{"type":"digest"}"#),
            Err(DecodeError::UnknownType("digest".to_string()))
        );
        assert_eq!(
            decode(r#"{"type":7}"#),
            Err(DecodeError::UnknownType("7".to_string()))
        );
    }

    #[test]
    fn test_log_fields_must_be_text() {
        assert_eq!(
            decode(r#"{"type":"log","message":5,"level":"info"}"#),
            Err(violation(MessageType::Log, "message"))
        );
        assert_eq!(
            decode(r#"{"type":"log","message":"hi"}"#),
            Err(violation(MessageType::Log, "level"))
        );
    }

    #[test]
    fn test_sensor_data_schema() {
        let ok = decode(
            r#"{"type":"sensor_data","time":1700000000000000000,"sensor":"gps",
                "measurements":{"lat":39.1,"lon":-108.4}}"#,
        )
        .unwrap();
        assert_eq!(ok.message_type(), MessageType::SensorData);

        assert_eq!(
            decode(r#"{"type":"sensor_data","time":1.5,"sensor":"gps","measurements":{}}"#),
            Err(violation(MessageType::SensorData, "time"))
        );
        assert_eq!(
            decode(r#"{"type":"sensor_data","time":1,"sensor":"gps"}"#),
            Err(violation(MessageType::SensorData, "measurements"))
        );
    }

    #[test]
    fn test_out_of_range_values_pass_through() {
        let msg = decode(
            r#"{"type":"sensor_data","time":1,"sensor":"gps","measurements":{"lat":200.0,"lon":-900}}"#,
        )
        .unwrap();
        let Message::SensorData(data) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(data.measurements["lat"], json!(200.0));
    }

    #[test]
    fn test_query_base_response_value_any_type() {
        for value in ["null", "3", "\"x\"", "[1,2]", "{\"a\":1}"] {
            let text = format!(r#"{{"type":"query_base_response","query":"q","value":{value}}}"#);
            assert!(decode(&text).is_ok(), "value {value} should pass");
        }
        assert_eq!(
            decode(r#"{"type":"query_base_response","query":"q"}"#),
            Err(violation(MessageType::QueryBaseResponse, "value"))
        );
    }

    #[test]
    fn test_auth_response_user_optional() {
        let msg = decode(r#"{"type":"auth_response","success":false}"#).unwrap();
        let Message::AuthResponse(resp) = msg else {
            panic!("Wrong message type");
        };
        assert!(!resp.success);
        assert!(resp.user.is_none());

        let msg = decode(r#"{"type":"auth_response","success":true,"user":null}"#).unwrap();
        assert_eq!(msg.message_type(), MessageType::AuthResponse);

        assert_eq!(
            decode(r#"{"type":"auth_response","success":"yes"}"#),
            Err(violation(MessageType::AuthResponse, "success"))
        );
    }

    #[test]
    fn test_nested_drive_command_violations() {
        assert_eq!(
            decode(r#"{"type":"command_ended","command":{"type":"move_distance","distance":1,"speed":"fast","angle":0},"completed":true}"#),
            Err(violation(MessageType::CommandEnded, "command.speed"))
        );
        assert_eq!(
            decode(r#"{"type":"command_ended","command":{"type":"teleport"},"completed":true}"#),
            Err(violation(MessageType::CommandEnded, "command.type"))
        );
        assert_eq!(
            decode(r#"{"type":"command_ended","completed":true}"#),
            Err(violation(MessageType::CommandEnded, "command"))
        );
    }

    #[test]
    fn test_command_status_allows_null_command() {
        let msg = decode(r#"{"type":"command_status","command":null}"#).unwrap();
        assert_eq!(
            msg,
            Message::CommandStatus(crate::protocol::CommandStatusMessage { command: None })
        );

        let msg = decode(
            r#"{"type":"command_status","command":{"type":"move_continuous","speed":1,"angle":0}}"#,
        )
        .unwrap();
        let Message::CommandStatus(status) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(
            status.command,
            Some(DriveCommand::MoveContinuous {
                speed: 1.0,
                angle: 0.0
            })
        );
    }

    #[test]
    fn test_extra_fields_ignored() {
        let msg = decode(r#"{"type":"e_stop","source":"console","id":4}"#).unwrap();
        assert_eq!(msg, Message::EStop);
    }

    #[test]
    fn test_option_get_must_be_text_list() {
        assert_eq!(
            decode(r#"{"type":"option","get":["a",1],"set":{}}"#),
            Err(violation(MessageType::Option, "get"))
        );
    }
}
