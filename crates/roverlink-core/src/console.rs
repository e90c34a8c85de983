//! Operator console
//!
//! Keeps the scroll-back of log lines shown to the operator and forwards
//! each new line to the presentation sink. Lines from the rover, the base
//! station and the operator's own input all land here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ConsoleConfig;
use crate::events::EventSink;

/// Log severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Parse a level name, accepting the `warn` and `fatal` aliases
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "critical" | "fatal" => Some(LogLevel::Critical),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of console output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleLine {
    pub timestamp: DateTime<Utc>,
    /// Level label as shown; `None` for operator echo lines
    pub level: Option<String>,
    pub text: String,
}

impl ConsoleLine {
    /// Parsed severity, if the label is a known level
    pub fn severity(&self) -> Option<LogLevel> {
        self.level.as_deref().and_then(LogLevel::parse)
    }
}

impl fmt::Display for ConsoleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.level {
            Some(level) => write!(f, "[{level}] {}", self.text),
            None => f.write_str(&self.text),
        }
    }
}

pub struct Console {
    lines: Mutex<VecDeque<ConsoleLine>>,
    capacity: usize,
    show_debug: bool,
    sink: Arc<dyn EventSink>,
}

impl Console {
    pub fn new(config: &ConsoleConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(config.capacity.min(1024))),
            capacity: config.capacity.max(1),
            show_debug: config.show_debug,
            sink,
        }
    }

    /// Append a line; returns `None` when the line is filtered out
    fn write(&self, message: &str, level: Option<String>) -> Option<ConsoleLine> {
        let line = ConsoleLine {
            timestamp: Utc::now(),
            level,
            text: message.to_string(),
        };
        if line.severity() == Some(LogLevel::Debug) && !self.show_debug {
            return None;
        }

        {
            let mut lines = self.lock();
            while lines.len() >= self.capacity {
                lines.pop_front();
            }
            lines.push_back(line.clone());
        }

        if let Err(e) = self.sink.emit_console(&line) {
            tracing::warn!("Failed to emit console line: {}", e);
        }
        Some(line)
    }

    pub fn log(&self, message: &str, level: LogLevel) -> Option<ConsoleLine> {
        self.write(message, Some(level.to_string()))
    }

    /// Log a line whose level arrived as free text on the wire
    ///
    /// Known names (and their aliases) are normalized; anything else is
    /// shown as sent.
    pub fn log_named(&self, message: &str, level: &str) -> Option<ConsoleLine> {
        match LogLevel::parse(level) {
            Some(level) => self.log(message, level),
            None => {
                tracing::debug!(level, "Unrecognized log level");
                self.write(message, Some(level.to_string()))
            }
        }
    }

    /// Echo operator input as `> text`
    pub fn echo_input(&self, input: &str) -> Option<ConsoleLine> {
        self.write(&format!("> {input}"), None)
    }

    /// Snapshot of the scroll-back, oldest first
    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ConsoleLine>> {
        // A panicking handler must not take the console down with it.
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("lines", &self.len())
            .field("capacity", &self.capacity)
            .field("show_debug", &self.show_debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MemoryEventSink, SinkEvent};

    fn new_console(capacity: usize, show_debug: bool) -> (Console, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        let config = ConsoleConfig {
            capacity,
            show_debug,
        };
        (Console::new(&config, sink.clone()), sink)
    }

    #[test]
    fn test_level_parse_aliases() {
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("fatal"), Some(LogLevel::Critical));
        assert_eq!(LogLevel::parse(" info "), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("verbose"), None);
        assert!(LogLevel::Critical > LogLevel::Warning);
    }

    #[test]
    fn test_line_format() {
        let (console, _) = new_console(10, false);
        let line = console.log("rover online", LogLevel::Info).unwrap();
        assert_eq!(line.to_string(), "[info] rover online");

        let line = console.echo_input("estop").unwrap();
        assert_eq!(line.to_string(), "> estop");
    }

    #[test]
    fn test_debug_hidden_by_default() {
        let (console, sink) = new_console(10, false);
        assert!(console.log("noise", LogLevel::Debug).is_none());
        assert!(console.is_empty());
        assert!(sink.events().is_empty());

        let (verbose, _) = new_console(10, true);
        assert!(verbose.log("noise", LogLevel::Debug).is_some());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let (console, _) = new_console(3, false);
        for i in 0..5 {
            console.log(&format!("line {i}"), LogLevel::Info);
        }
        let texts: Vec<String> = console.lines().into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_lines_forwarded_to_sink() {
        let (console, sink) = new_console(10, false);
        console.log_named("camera restarted", "warn");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            SinkEvent::Console(line) => {
                assert_eq!(line.severity(), Some(LogLevel::Warning));
                assert_eq!(line.to_string(), "[warning] camera restarted");
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_level_shown_verbatim() {
        let (console, _) = new_console(10, false);
        let line = console.log_named("odd", "loud").unwrap();
        assert_eq!(line.severity(), None);
        assert_eq!(line.to_string(), "[loud] odd");
    }

    #[test]
    fn test_wire_debug_level_filtered() {
        let (console, _) = new_console(10, false);
        assert!(console.log_named("noise", "DEBUG").is_none());
    }
}
