//! Default handlers for an operator session
//!
//! Wires inbound message types to the console and the telemetry sink.

use std::sync::Arc;

use crate::console::{Console, LogLevel};
use crate::dispatcher::{DispatchError, HandlerTable};
use crate::events::EventSink;
use crate::protocol::{Message, MessageType};
use crate::telemetry::TelemetryUpdate;

/// Handler table used by the CLI and most embedders
pub fn default_table(
    console: Arc<Console>,
    sink: Arc<dyn EventSink>,
) -> Result<HandlerTable, DispatchError> {
    let mut table = HandlerTable::new();

    let out = console.clone();
    table.register(MessageType::Log, move |message| {
        if let Message::Log(log) = message {
            out.log_named(&log.message, &log.level);
        }
        Ok(())
    })?;

    table.register(MessageType::SensorData, move |message| {
        if let Message::SensorData(data) = message {
            let update = TelemetryUpdate::from_sensor_data(data)?;
            sink.emit_telemetry(&update)?;
        }
        Ok(())
    })?;

    let out = console.clone();
    table.register(MessageType::CommandStatus, move |message| {
        if let Message::CommandStatus(status) = message {
            match &status.command {
                Some(command) => out.log(&format!("Current command: {command}"), LogLevel::Info),
                None => out.log("No command running", LogLevel::Info),
            };
        }
        Ok(())
    })?;

    let out = console.clone();
    table.register(MessageType::CommandEnded, move |message| {
        if let Message::CommandEnded(ended) = message {
            if ended.completed {
                out.log(&format!("Command completed: {}", ended.command), LogLevel::Info);
            } else {
                out.log(
                    &format!("Command interrupted: {}", ended.command),
                    LogLevel::Warning,
                );
            }
        }
        Ok(())
    })?;

    let out = console.clone();
    table.register(MessageType::OptionResponse, move |message| {
        if let Message::OptionResponse(response) = message {
            for (name, value) in &response.values {
                out.log(&format!("Option {name} = {value}"), LogLevel::Info);
            }
        }
        Ok(())
    })?;

    let out = console.clone();
    table.register(MessageType::QueryBaseResponse, move |message| {
        if let Message::QueryBaseResponse(response) = message {
            out.log(
                &format!("Query {} = {}", response.query, response.value),
                LogLevel::Info,
            );
        }
        Ok(())
    })?;

    table.register(MessageType::EStop, move |_| {
        console.log("Emergency stop engaged", LogLevel::Warning);
        Ok(())
    })?;

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsoleConfig;
    use crate::dispatcher::Dispatcher;
    use crate::events::{MemoryEventSink, SinkEvent};
    use crate::protocol::{
        CommandEndedMessage, DriveCommand, LogMessage, OptionResponseMessage, SensorDataMessage,
    };
    use crate::telemetry::Telemetry;
    use serde_json::json;

    fn setup() -> (Dispatcher, Arc<Console>, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        let console = Arc::new(Console::new(&ConsoleConfig::default(), sink.clone()));
        let table = default_table(console.clone(), sink.clone()).unwrap();
        (table.build(), console, sink)
    }

    fn console_text(console: &Console) -> Vec<String> {
        console.lines().iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_log_goes_to_console() {
        let (mut dispatcher, console, _) = setup();
        dispatcher
            .dispatch(&Message::Log(LogMessage {
                message: "GPS fix acquired".to_string(),
                level: "info".to_string(),
            }))
            .unwrap();
        assert_eq!(console_text(&console), vec!["[info] GPS fix acquired"]);
    }

    #[test]
    fn test_sensor_data_emits_telemetry() {
        let (mut dispatcher, _, sink) = setup();
        let message = Message::SensorData(SensorDataMessage {
            time: 0,
            sensor: "imu".to_string(),
            measurements: json!({"roll": 1.0, "pitch": 2.0, "yaw": 3.0})
                .as_object()
                .cloned()
                .unwrap(),
        });
        dispatcher.dispatch(&message).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            SinkEvent::Telemetry(update) => assert_eq!(
                update.telemetry,
                Telemetry::Orientation {
                    roll: 1.0,
                    pitch: 2.0,
                    yaw: 3.0
                }
            ),
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_sensor_data_is_handler_error() {
        let (mut dispatcher, _, _) = setup();
        let message = Message::SensorData(SensorDataMessage {
            time: 0,
            sensor: "gps".to_string(),
            measurements: json!({"lat": 1.0}).as_object().cloned().unwrap(),
        });
        let err = dispatcher.dispatch(&message).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::HandlerError {
                message_type: MessageType::SensorData,
                ..
            }
        ));
    }

    #[test]
    fn test_command_ended_and_options() {
        let (mut dispatcher, console, _) = setup();
        dispatcher
            .dispatch(&Message::CommandEnded(CommandEndedMessage {
                command: DriveCommand::MoveContinuous {
                    speed: 0.5,
                    angle: 0.0,
                },
                completed: false,
            }))
            .unwrap();
        dispatcher
            .dispatch(&Message::OptionResponse(OptionResponseMessage {
                values: json!({"camera_fps": 15}).as_object().cloned().unwrap(),
            }))
            .unwrap();
        dispatcher.dispatch(&Message::EStop).unwrap();

        assert_eq!(
            console_text(&console),
            vec![
                "[warning] Command interrupted: move_continuous(speed 0.5, angle 0)",
                "[info] Option camera_fps = 15",
                "[warning] Emergency stop engaged",
            ]
        );
    }

    #[test]
    fn test_auth_response_not_bound() {
        let (dispatcher, _, _) = setup();
        assert!(!dispatcher.handles(MessageType::AuthResponse));
        assert!(dispatcher.handles(MessageType::QueryBaseResponse));
    }
}
