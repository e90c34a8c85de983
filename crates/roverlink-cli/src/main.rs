//! Roverlink CLI
//!
//! Terminal driver console for the rover base station. Connects to the
//! base station's driver endpoint, authenticates with an operator token
//! and turns console commands into rover intents.

use clap::Parser;
use roverlink_core::config::ClientConfig;
use roverlink_core::console::Console;
use roverlink_core::events::{EventSink, StdoutEventSink};
use roverlink_core::protocol::Credential;
use roverlink_core::runtime::{ChannelTransport, SessionRuntime};
use roverlink_core::{handlers, ReconnectPolicy, SessionEngine};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

mod commands;
mod operator;

/// Roverlink - drive a rover from the terminal
///
/// Connects to the base station as a driver. Type `help` once connected.
#[derive(Parser, Debug)]
#[command(name = "roverlink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base station host
    #[arg(long)]
    host: Option<String>,

    /// Base station port
    #[arg(short, long)]
    port: Option<u16>,

    /// Driver endpoint path
    #[arg(long)]
    path: Option<String>,

    /// Connect with wss://
    #[arg(long)]
    secure: bool,

    /// Operator token (prompted for when absent)
    #[arg(short, long, env = "ROVERLINK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Delay between reconnect attempts
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// Give up after this many consecutive reconnect attempts
    #[arg(long)]
    max_reconnects: Option<u32>,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Args {
    fn load_config(&self) -> Result<ClientConfig, String> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::load_or_default()?,
        };

        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.path {
            config.server.path = path.clone();
        }
        if self.secure {
            config.server.secure = true;
        }
        if let Some(delay_ms) = self.reconnect_delay_ms {
            config.reconnect.delay_ms = delay_ms;
        }
        if self.max_reconnects.is_some() {
            config.reconnect.max_attempts = self.max_reconnects;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; stdout is reserved for the console
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let token = match args.token {
        Some(token) if !token.trim().is_empty() => token,
        _ => match prompt_token(&mut input).await {
            Some(token) => token,
            None => {
                eprintln!("Error: No token given");
                return ExitCode::FAILURE;
            }
        },
    };

    let json_output = matches!(args.format, OutputFormat::Json);
    let sink: Arc<dyn EventSink> = Arc::new(StdoutEventSink::new(json_output));
    let console = Arc::new(Console::new(&config.console, sink.clone()));

    let table = match handlers::default_table(console.clone(), sink.clone()) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (transport, requests) = ChannelTransport::new();
    let engine = SessionEngine::new(config.url(), transport, table.build(), sink)
        .with_reconnect_policy(ReconnectPolicy::from_config(&config.reconnect));
    let (runtime, handle) = SessionRuntime::new(engine, requests);

    tracing::info!("Connecting to base station at {}", config.url());
    let session = tokio::spawn(runtime.run(Credential::new(token)));

    if let Err(e) = operator::run_operator_console(handle, console, input).await {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match session.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: session task failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Ask for a token on stdin until a non-empty one is entered
async fn prompt_token<R>(input: &mut tokio::io::Lines<R>) -> Option<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut stderr = tokio::io::stderr();
    loop {
        let _ = stderr.write_all(b"Token: ").await;
        let _ = stderr.flush().await;
        match input.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => return Some(line.trim().to_string()),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}
