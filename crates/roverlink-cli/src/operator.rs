//! Interactive operator loop
//!
//! Reads console commands from stdin and forwards them to the running
//! session until the operator quits, stdin closes or Ctrl-C is pressed.

use roverlink_core::console::{Console, LogLevel};
use roverlink_core::protocol::Credential;
use roverlink_core::runtime::SessionHandle;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, Lines};

use crate::commands::{self, ConsoleCommand};

pub async fn run_operator_console<R>(
    handle: SessionHandle,
    console: Arc<Console>,
    mut input: Lines<R>,
) -> Result<(), String>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = tokio::select! {
            line = input.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("Stdin closed");
                    break;
                }
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        console.echo_input(commands::echo_text(&line));

        let command = match commands::parse(&line) {
            Ok(command) => command,
            Err(usage) => {
                console.log(&usage, LogLevel::Error);
                continue;
            }
        };

        let result = match command {
            ConsoleCommand::Empty => Ok(()),
            ConsoleCommand::Send(intent) => handle.send(intent).await,
            ConsoleCommand::Say { level, text } => handle.log(text, level).await,
            ConsoleCommand::Auth(token) => handle.start(Credential::new(token)).await,
            ConsoleCommand::Status => handle.status().await.map(|status| {
                let user = status.user.as_deref().unwrap_or("-");
                console.log(
                    &format!(
                        "Session {} {} as {} ({})",
                        status.session_id, status.state, user, status.url
                    ),
                    LogLevel::Info,
                );
                if let Some(attempt) = status.reconnect_attempt {
                    console.log(&format!("Reconnect attempt {attempt} pending"), LogLevel::Info);
                }
            }),
            ConsoleCommand::Help => {
                for line in commands::HELP {
                    console.log(line, LogLevel::Info);
                }
                Ok(())
            }
            ConsoleCommand::Quit => break,
        };

        if let Err(e) = result {
            console.log(&e.to_string(), LogLevel::Error);
        }
    }

    handle.shutdown().await;
    Ok(())
}
