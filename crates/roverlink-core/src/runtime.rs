//! WebSocket session runtime
//!
//! Drives a [`SessionEngine`] over a real WebSocket connection. One
//! `select!` loop owns the engine and serializes every input to it:
//! connection events, the reconnect timer and operator requests arriving
//! through a [`SessionHandle`].

use futures_util::{SinkExt, StreamExt};
use std::future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::console::LogLevel;
use crate::engine::{ReconnectTicket, SessionEngine, SessionStatus};
use crate::error::{ClientError, Result};
use crate::protocol::{Credential, Intent};
use crate::transport::{Transport, TransportError};

/// How long shutdown waits for the close handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    Open(String),
    Close,
}

/// Receiving end of a [`ChannelTransport`]'s requests
#[derive(Debug)]
pub struct TransportRequests(mpsc::UnboundedReceiver<TransportRequest>);

/// [`Transport`] backed by the runtime loop
///
/// `open` and `close` are queued for the runtime; `send` writes to the
/// connection currently attached, if any.
#[derive(Debug)]
pub struct ChannelTransport {
    requests: mpsc::UnboundedSender<TransportRequest>,
    writer: Option<mpsc::UnboundedSender<String>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, TransportRequests) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                requests: tx,
                writer: None,
            },
            TransportRequests(rx),
        )
    }

    /// Route outgoing frames to an open connection
    pub fn attach(&mut self, writer: mpsc::UnboundedSender<String>) {
        self.writer = Some(writer);
    }

    pub fn detach(&mut self) {
        self.writer = None;
    }

    pub fn is_attached(&self) -> bool {
        self.writer.is_some()
    }
}

impl Transport for ChannelTransport {
    fn open(&mut self, url: &str) -> std::result::Result<(), TransportError> {
        if self.writer.is_some() {
            return Err(TransportError::AlreadyRunning);
        }
        self.requests
            .send(TransportRequest::Open(url.to_string()))
            .map_err(|_| TransportError::OpenFailed("runtime stopped".to_string()))
    }

    fn send(&mut self, text: &str) -> std::result::Result<(), TransportError> {
        let writer = self.writer.as_ref().ok_or(TransportError::NotRunning)?;
        writer
            .send(text.to_string())
            .map_err(|_| TransportError::SendFailed("connection closed".to_string()))
    }

    fn close(&mut self) {
        // Dropping the writer ends the connection task's outgoing side.
        self.writer = None;
        let _ = self.requests.send(TransportRequest::Close);
    }
}

#[derive(Debug)]
enum ConnectionEvent {
    Opened(mpsc::UnboundedSender<String>),
    Text(String),
    Binary(Vec<u8>),
    Closed,
    Error(TransportError),
}

enum Control {
    Start(Credential, oneshot::Sender<Result<()>>),
    Send(Intent, oneshot::Sender<Result<()>>),
    Status(oneshot::Sender<SessionStatus>),
    Shutdown,
}

/// Cloneable handle for talking to a running session
#[derive(Clone)]
pub struct SessionHandle {
    control: mpsc::Sender<Control>,
}

impl SessionHandle {
    /// Send an intent and wait for the engine's verdict
    pub async fn send(&self, intent: Intent) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(Control::Send(intent, tx)).await?;
        rx.await.map_err(|_| ClientError::ShutDown)?
    }

    /// Send a console line to the base station
    pub async fn log(&self, message: impl Into<String>, level: LogLevel) -> Result<()> {
        self.send(Intent::log(message, level.as_str())).await
    }

    /// Start again with a new credential (e.g. after a rejected token)
    pub async fn start(&self, credential: Credential) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(Control::Start(credential, tx)).await?;
        rx.await.map_err(|_| ClientError::ShutDown)?
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let (tx, rx) = oneshot::channel();
        self.request(Control::Status(tx)).await?;
        rx.await.map_err(|_| ClientError::ShutDown)
    }

    /// Ask the runtime to shut the session down; idempotent
    pub async fn shutdown(&self) {
        let _ = self.control.send(Control::Shutdown).await;
    }

    async fn request(&self, control: Control) -> Result<()> {
        self.control
            .send(control)
            .await
            .map_err(|_| ClientError::ShutDown)
    }
}

/// Owns the engine and the WebSocket connection task
pub struct SessionRuntime {
    engine: SessionEngine<ChannelTransport>,
    requests: mpsc::UnboundedReceiver<TransportRequest>,
    control: mpsc::Receiver<Control>,
    events_tx: mpsc::UnboundedSender<(u64, ConnectionEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, ConnectionEvent)>,
    /// Bumped on every open/close so events from old connections are dropped
    generation: u64,
    connection: Option<JoinHandle<()>>,
    timer: Option<(ReconnectTicket, Pin<Box<Sleep>>)>,
}

impl SessionRuntime {
    pub fn new(
        engine: SessionEngine<ChannelTransport>,
        requests: TransportRequests,
    ) -> (Self, SessionHandle) {
        let (control_tx, control_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let runtime = Self {
            engine,
            requests: requests.0,
            control: control_rx,
            events_tx,
            events_rx,
            generation: 0,
            connection: None,
            timer: None,
        };
        (
            runtime,
            SessionHandle {
                control: control_tx,
            },
        )
    }

    pub fn engine(&self) -> &SessionEngine<ChannelTransport> {
        &self.engine
    }

    /// Run the session until shutdown is requested or every handle is dropped
    pub async fn run(mut self, credential: Credential) -> Result<()> {
        self.engine.start(credential)?;
        info!(session_id = %self.engine.session_id(), "Session runtime started");

        loop {
            self.sync_timer();

            let timer = &mut self.timer;
            let reconnect = async move {
                match timer {
                    Some((ticket, sleep)) => {
                        sleep.as_mut().await;
                        *ticket
                    }
                    None => future::pending().await,
                }
            };

            tokio::select! {
                Some(request) = self.requests.recv() => self.handle_request(request),
                Some((generation, event)) = self.events_rx.recv() => {
                    self.handle_connection_event(generation, event)
                }
                ticket = reconnect => {
                    self.timer = None;
                    if let Err(e) = self.engine.reconnect_timer_fired(ticket) {
                        warn!("Reconnect attempt failed: {}", e);
                    }
                }
                control = self.control.recv() => match control {
                    Some(control) => self.handle_control(control),
                    None => {
                        debug!("All session handles dropped");
                        self.engine.shutdown();
                    }
                },
            }

            if self.engine.is_shut_down() {
                break;
            }
        }

        self.finish().await;
        Ok(())
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Start(credential, reply) => {
                let _ = reply.send(self.engine.start(credential));
            }
            Control::Send(intent, reply) => {
                let _ = reply.send(self.engine.send_intent(intent));
            }
            Control::Status(reply) => {
                let _ = reply.send(self.engine.status());
            }
            Control::Shutdown => self.engine.shutdown(),
        }
    }

    fn handle_request(&mut self, request: TransportRequest) {
        match request {
            TransportRequest::Open(url) => {
                self.generation += 1;
                if let Some(previous) = self.connection.take() {
                    previous.abort();
                }
                debug!(generation = self.generation, "Opening connection to {}", url);
                self.connection = Some(tokio::spawn(run_connection(
                    url,
                    self.generation,
                    self.events_tx.clone(),
                )));
            }
            TransportRequest::Close => {
                // The task winds down by itself once its writer is gone.
                self.generation += 1;
            }
        }
    }

    fn handle_connection_event(&mut self, generation: u64, event: ConnectionEvent) {
        if generation != self.generation {
            debug!(generation, "Dropping event from stale connection");
            return;
        }

        match event {
            ConnectionEvent::Opened(writer) => {
                self.engine.transport_mut().attach(writer);
                if let Err(e) = self.engine.transport_opened() {
                    error!("Failed to start handshake: {}", e);
                }
            }
            ConnectionEvent::Text(text) => self.engine.frame_received(&text),
            ConnectionEvent::Binary(data) => self.engine.binary_received(&data),
            ConnectionEvent::Closed => {
                self.engine.transport_mut().detach();
                self.engine.transport_closed();
            }
            ConnectionEvent::Error(err) => {
                self.engine.transport_mut().detach();
                self.engine.transport_error(&err.to_string());
            }
        }
    }

    /// Keep the reconnect sleep in step with the engine's pending ticket
    fn sync_timer(&mut self) {
        let pending = self.engine.pending_reconnect();
        let armed = self.timer.as_ref().map(|(ticket, _)| *ticket);

        match pending {
            Some(p) if armed != Some(p.ticket) => {
                debug!(attempt = p.attempt, "Arming reconnect timer");
                self.timer = Some((p.ticket, Box::pin(tokio::time::sleep(p.delay))));
            }
            None if armed.is_some() => self.timer = None,
            _ => {}
        }
    }

    async fn finish(self) {
        let SessionRuntime {
            engine,
            events_rx,
            connection,
            ..
        } = self;
        // An undelivered `Opened` event still holds a writer for the task.
        drop(events_rx);

        if let Some(connection) = connection {
            let abort = connection.abort_handle();
            if tokio::time::timeout(CLOSE_TIMEOUT, connection).await.is_err() {
                abort.abort();
            }
        }
        info!(session_id = %engine.session_id(), "Session runtime stopped");
    }
}

async fn run_connection(
    url: String,
    generation: u64,
    events: mpsc::UnboundedSender<(u64, ConnectionEvent)>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", url, e);
            let err = TransportError::OpenFailed(e.to_string());
            let _ = events.send((generation, ConnectionEvent::Error(err)));
            return;
        }
    };
    info!("Connected to {}", url);

    let (mut write, mut read) = stream.split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();
    if events
        .send((generation, ConnectionEvent::Opened(writer_tx)))
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            outgoing = writer_rx.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = write.send(WsMessage::Text(text)).await {
                        let err = TransportError::WebSocket(e.to_string());
                        let _ = events.send((generation, ConnectionEvent::Error(err)));
                        return;
                    }
                }
                None => {
                    debug!("Closing connection to {}", url);
                    let _ = write.close().await;
                    return;
                }
            },
            incoming = read.next() => {
                let event = match incoming {
                    Some(Ok(WsMessage::Text(text))) => ConnectionEvent::Text(text),
                    Some(Ok(WsMessage::Binary(data))) => ConnectionEvent::Binary(data),
                    Some(Ok(WsMessage::Close(_))) | None => ConnectionEvent::Closed,
                    Some(Ok(_)) => continue, // ping/pong are answered by tungstenite
                    Some(Err(e)) => ConnectionEvent::Error(TransportError::WebSocket(e.to_string())),
                };
                let done = matches!(event, ConnectionEvent::Closed | ConnectionEvent::Error(_));
                if events.send((generation, event)).is_err() || done {
                    return;
                }
            }
        }
    }
}
