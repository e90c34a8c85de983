//! Operator console commands
//!
//! Parses one line of operator input. Anything that is not a known
//! command is broadcast to the base station as an `info` log line.

use roverlink_core::console::LogLevel;
use roverlink_core::protocol::Intent;
use serde_json::{Map, Value};

pub const HELP: &[&str] = &[
    "drive <distance> <speed> <angle>  drive a set distance",
    "go <speed> <angle>                drive until stopped",
    "stop                              clear the current command",
    "estop | !                         emergency stop",
    "query <name>                      query the base station",
    "get <option>...                   read rover options",
    "set <option> <json>               change a rover option",
    "say [level] <text>                log to the base station",
    "auth <token>                      retry authentication",
    "status                            show session status",
    "help                              show this list",
    "quit                              end the session",
];

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Empty,
    Send(Intent),
    Say { level: LogLevel, text: String },
    Auth(String),
    Status,
    Help,
    Quit,
}

pub fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match word.to_ascii_lowercase().as_str() {
        "" => ConsoleCommand::Empty,
        "drive" => {
            let [distance, speed, angle] = numbers::<3>("drive", &args)?;
            ConsoleCommand::Send(Intent::drive(distance, speed, angle))
        }
        "go" => {
            let [speed, angle] = numbers::<2>("go", &args)?;
            ConsoleCommand::Send(Intent::drive_continuous(speed, angle))
        }
        "stop" => ConsoleCommand::Send(Intent::Command { command: None }),
        "estop" | "!" => ConsoleCommand::Send(Intent::EStop),
        "query" => match args.as_slice() {
            [name] => ConsoleCommand::Send(Intent::query(*name)),
            _ => return Err("usage: query <name>".to_string()),
        },
        "get" => {
            if args.is_empty() {
                return Err("usage: get <option>...".to_string());
            }
            ConsoleCommand::Send(Intent::Option {
                get: args.iter().map(|s| s.to_string()).collect(),
                set: Map::new(),
            })
        }
        "set" => {
            let Some((name, value)) = rest.split_once(char::is_whitespace) else {
                return Err("usage: set <option> <json>".to_string());
            };
            let value = value.trim();
            // Bare words are sent as strings
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
            let mut set = Map::new();
            set.insert(name.to_string(), value);
            ConsoleCommand::Send(Intent::Option { get: Vec::new(), set })
        }
        "say" => {
            if rest.is_empty() {
                return Err("usage: say [level] <text>".to_string());
            }
            let leveled = rest
                .split_once(char::is_whitespace)
                .and_then(|(level, text)| LogLevel::parse(level).map(|level| (level, text)));
            match leveled {
                Some((level, text)) => ConsoleCommand::Say {
                    level,
                    text: text.trim().to_string(),
                },
                None => ConsoleCommand::Say {
                    level: LogLevel::Info,
                    text: rest.to_string(),
                },
            }
        }
        "auth" => match args.as_slice() {
            [token] => ConsoleCommand::Auth(token.to_string()),
            _ => return Err("usage: auth <token>".to_string()),
        },
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => ConsoleCommand::Say {
            level: LogLevel::Info,
            text: line.to_string(),
        },
    };
    Ok(command)
}

/// Text echoed to the console for an input line; `auth` arguments are masked
pub fn echo_text(line: &str) -> &str {
    let line = line.trim();
    let word = line.split_whitespace().next().unwrap_or("");
    if word.eq_ignore_ascii_case("auth") && word.len() < line.len() {
        "auth ********"
    } else {
        line
    }
}

fn numbers<const N: usize>(command: &str, args: &[&str]) -> Result<[f64; N], String> {
    if args.len() != N {
        return Err(format!("{command} takes {N} numbers"));
    }
    let mut values = [0.0; N];
    for (slot, arg) in values.iter_mut().zip(args) {
        *slot = arg
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| format!("{command}: '{arg}' is not a number"))?;
    }
    Ok(values)
}
