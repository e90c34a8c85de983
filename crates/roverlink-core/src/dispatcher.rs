//! Message dispatch
//!
//! Routes each decoded inbound message to the one handler registered for
//! its type. Handlers are bound in a [`HandlerTable`] at startup; the table
//! is then frozen into a [`Dispatcher`] and never changes for the life of
//! the session.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::protocol::{Message, MessageType};

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Errors raised while building or using the dispatch table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("A handler is already registered for {0}")]
    DuplicateHandler(MessageType),

    #[error("No handler registered for {0}")]
    UnhandledMessageType(MessageType),

    #[error("Handler for {message_type} failed: {cause}")]
    HandlerError {
        message_type: MessageType,
        cause: String,
    },
}

/// Reaction to one kind of inbound message
pub type Handler = Box<dyn FnMut(&Message) -> HandlerResult + Send>;

/// Handler bindings under construction
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<MessageType, Handler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `message_type`; at most one handler per type
    pub fn register<F>(&mut self, message_type: MessageType, handler: F) -> Result<(), DispatchError>
    where
        F: FnMut(&Message) -> HandlerResult + Send + 'static,
    {
        if self.handlers.contains_key(&message_type) {
            return Err(DispatchError::DuplicateHandler(message_type));
        }
        self.handlers.insert(message_type, Box::new(handler));
        Ok(())
    }

    pub fn contains(&self, message_type: MessageType) -> bool {
        self.handlers.contains_key(&message_type)
    }

    /// Freeze the table
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            handlers: self.handlers,
        }
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerTable").field("types", &types).finish()
    }
}

/// Frozen handler table
pub struct Dispatcher {
    handlers: HashMap<MessageType, Handler>,
}

impl Dispatcher {
    /// A dispatcher with no handlers; every message is unhandled
    pub fn empty() -> Self {
        HandlerTable::new().build()
    }

    pub fn handles(&self, message_type: MessageType) -> bool {
        self.handlers.contains_key(&message_type)
    }

    /// Run the handler bound to the message's type
    ///
    /// A failing or panicking handler is contained here and reported as
    /// [`DispatchError::HandlerError`]; later dispatches are unaffected.
    pub fn dispatch(&mut self, message: &Message) -> Result<(), DispatchError> {
        let message_type = message.message_type();
        let handler = self
            .handlers
            .get_mut(&message_type)
            .ok_or(DispatchError::UnhandledMessageType(message_type))?;

        match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DispatchError::HandlerError {
                message_type,
                cause: e.to_string(),
            }),
            Err(payload) => Err(DispatchError::HandlerError {
                message_type,
                cause: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("Dispatcher").field("types", &types).finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("panicked: {text}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LogMessage, QueryBaseResponseMessage};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn log(text: &str) -> Message {
        Message::Log(LogMessage {
            message: text.to_string(),
            level: "info".to_string(),
        })
    }

    #[test]
    fn test_dispatch_to_bound_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut table = HandlerTable::new();
        let recorder = seen.clone();
        table
            .register(MessageType::Log, move |message| {
                if let Message::Log(log) = message {
                    recorder.lock().unwrap().push(log.message.clone());
                }
                Ok(())
            })
            .unwrap();

        let mut dispatcher = table.build();
        dispatcher.dispatch(&log("first")).unwrap();
        dispatcher.dispatch(&log("second")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut table = HandlerTable::new();
        table
            .register(MessageType::Log, |_| Ok(()))
            .unwrap();
        let err = table
            .register(MessageType::Log, |_| Ok(()))
            .unwrap_err();
        assert_eq!(err, DispatchError::DuplicateHandler(MessageType::Log));
    }

    #[test]
    fn test_unhandled_type_reported() {
        let mut dispatcher = Dispatcher::empty();
        let message = Message::QueryBaseResponse(QueryBaseResponseMessage {
            query: "uptime".to_string(),
            value: json!(12),
        });
        assert_eq!(
            dispatcher.dispatch(&message),
            Err(DispatchError::UnhandledMessageType(
                MessageType::QueryBaseResponse
            ))
        );
    }

    #[test]
    fn test_handler_error_contained() {
        let mut table = HandlerTable::new();
        table
            .register(MessageType::Log, |_| Err("console closed".into()))
            .unwrap();
        let mut dispatcher = table.build();

        assert_eq!(
            dispatcher.dispatch(&log("x")),
            Err(DispatchError::HandlerError {
                message_type: MessageType::Log,
                cause: "console closed".to_string(),
            })
        );
    }

    #[test]
    fn test_handler_panic_contained() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let mut table = HandlerTable::new();
        table
            .register(MessageType::Log, move |message| {
                *counter.lock().unwrap() += 1;
                if matches!(message, Message::Log(log) if log.message == "boom") {
                    panic!("bad frame");
                }
                Ok(())
            })
            .unwrap();
        let mut dispatcher = table.build();

        let err = dispatcher.dispatch(&log("boom")).unwrap_err();
        assert_eq!(
            err,
            DispatchError::HandlerError {
                message_type: MessageType::Log,
                cause: "panicked: bad frame".to_string(),
            }
        );

        // The same handler keeps working afterwards
        assert!(dispatcher.dispatch(&log("fine")).is_ok());
        assert_eq!(*calls.lock().unwrap(), 2);
    }
}
