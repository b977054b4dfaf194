//! Sensor stream client
//!
//! Owns at most one WebSocket session to the sensor. On open it sends the
//! greeting handshake; every inbound text frame is decoded and its moisture
//! value forwarded to the display sink. Failures after the connection is up
//! are logged and never retried.

use std::fmt;

use chrono::Local;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Endpoint;
use crate::display::DisplaySink;
use crate::protocol::{handshake_message, CalibrationRequest, ProtocolError, SensorReading};

type SensorSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors that can occur during client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    #[error("Not connected")]
    NotConnected,
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Lifecycle state of the client's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport handshake in progress
    Connecting,
    /// Connected, handshake sent
    Open,
    /// Never connected, or closed by either side
    Closed,
    /// The last connection attempt or session failed
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// What woke the pump loop
enum StreamEvent {
    Frame(Option<Result<Message, tungstenite::Error>>),
    Shutdown,
}

/// WebSocket client streaming sensor readings into a display sink
pub struct StreamClient<S: DisplaySink> {
    endpoint: Endpoint,
    element_id: String,
    sink: S,
    state: ConnectionState,
    connection_id: Option<Uuid>,
    socket: Option<SensorSocket>,
}

impl<S: DisplaySink> StreamClient<S> {
    /// Create a client that writes moisture values to gauge `element_id`
    pub fn new(endpoint: Endpoint, element_id: impl Into<String>, sink: S) -> Self {
        Self {
            endpoint,
            element_id: element_id.into(),
            sink,
            state: ConnectionState::Closed,
            connection_id: None,
            socket: None,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The endpoint this client connects to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The display sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Open the connection and send the greeting handshake
    ///
    /// Fails with [`ClientError::AlreadyConnected`] while a connection is
    /// connecting or open.
    pub async fn connect(&mut self) -> ClientResult<()> {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return Err(ClientError::AlreadyConnected(self.endpoint.url()));
        }

        let request = self.endpoint.to_request()?;
        let connection_id = Uuid::new_v4();

        self.state = ConnectionState::Connecting;
        info!("Connecting to {} [{}]", self.endpoint, connection_id);

        let (mut socket, response) = match connect_async(request).await {
            Ok(pair) => pair,
            Err(e) => {
                self.state = ConnectionState::Error;
                error!("Failed to connect to {}: {}", self.endpoint, e);
                return Err(e.into());
            }
        };
        debug!(
            "Handshake with {} completed (HTTP {})",
            self.endpoint,
            response.status()
        );

        let greeting = handshake_message(&Local::now());
        if let Err(e) = socket.send(Message::Text(greeting.clone())).await {
            self.state = ConnectionState::Error;
            error!("Failed to send handshake to {}: {}", self.endpoint, e);
            return Err(e.into());
        }
        debug!("Sent handshake: {}", greeting);

        self.socket = Some(socket);
        self.connection_id = Some(connection_id);
        self.state = ConnectionState::Open;
        info!("Connected to {} [{}]", self.endpoint, connection_id);
        Ok(())
    }

    /// Handle one inbound text frame
    ///
    /// Returns the value written to the sink, or `None` if the frame was
    /// dropped. Decode failures are logged only.
    pub fn on_message(&mut self, frame: &str) -> Option<f64> {
        debug!("Sensor: {}", frame);

        match SensorReading::from_json(frame) {
            Ok(reading) => {
                debug!(
                    moisture_raw = ?reading.moisture_raw,
                    moisture_percent = ?reading.moisture_percent,
                    battery_percent = ?reading.battery_percent,
                    temperature = ?reading.temperature,
                    "Sensor reading"
                );
                self.sink.update(&self.element_id, reading.moisture);
                Some(reading.moisture)
            }
            Err(e) => {
                warn!("Ignoring frame from {}: {}", self.endpoint, e);
                None
            }
        }
    }

    /// Handle a transport error. The connection is dropped, not retried.
    pub fn on_error(&mut self, err: &tungstenite::Error) {
        error!(
            "WebSocket error from {} [{}]: {}",
            self.endpoint,
            self.connection_label(),
            err
        );
        self.socket = None;
        self.state = ConnectionState::Error;
    }

    /// Handle the connection closing. No reconnection is attempted.
    pub fn on_close(&mut self) {
        info!(
            "WebSocket connection to {} closed [{}]",
            self.endpoint,
            self.connection_label()
        );
        self.socket = None;
        self.state = ConnectionState::Closed;
    }

    /// Send a calibration request on the open connection
    pub async fn send_calibration(&mut self, request: &CalibrationRequest) -> ClientResult<()> {
        let json = request.to_json()?;
        let socket = self.socket.as_mut().ok_or(ClientError::NotConnected)?;

        if let Err(e) = socket.send(Message::Text(json)).await {
            self.on_error(&e);
            return Err(e.into());
        }
        info!(
            "Sent calibration to {}: dry={}, wet={}, battery={}",
            self.endpoint, request.dry, request.wet, request.battery
        );
        Ok(())
    }

    /// Close the open connection
    pub async fn close(&mut self) -> ClientResult<()> {
        let mut socket = self.socket.take().ok_or(ClientError::NotConnected)?;

        let result = socket.close(None).await;
        self.on_close();
        result.map_err(ClientError::from)
    }

    /// Connect and pump frames until the stream ends or shutdown is signalled
    ///
    /// Only the initial connect can fail; errors afterwards are logged and end
    /// the loop.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> ClientResult<()> {
        self.connect().await?;

        loop {
            let event = {
                let Some(socket) = self.socket.as_mut() else {
                    break;
                };
                tokio::select! {
                    msg = socket.next() => StreamEvent::Frame(msg),
                    _ = shutdown.recv() => StreamEvent::Shutdown,
                }
            };

            match event {
                StreamEvent::Frame(Some(Ok(Message::Text(text)))) => {
                    self.on_message(&text);
                }
                StreamEvent::Frame(Some(Ok(Message::Binary(data)))) => {
                    warn!(
                        "Received binary frame from {} ({} bytes), ignoring",
                        self.endpoint,
                        data.len()
                    );
                }
                StreamEvent::Frame(Some(Ok(Message::Ping(data)))) => {
                    if let Some(socket) = self.socket.as_mut() {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            self.on_error(&e);
                        }
                    }
                }
                StreamEvent::Frame(Some(Ok(Message::Pong(_)))) => {
                    // Ignore pong messages
                }
                StreamEvent::Frame(Some(Ok(Message::Close(frame)))) => {
                    // Keep reading so the queued close reply gets flushed;
                    // the stream then ends with `None`.
                    debug!("Sensor sent close frame: {:?}", frame);
                }
                StreamEvent::Frame(Some(Ok(Message::Frame(_)))) => {
                    // Raw frame, ignore
                }
                StreamEvent::Frame(Some(Err(e))) => {
                    self.on_error(&e);
                }
                StreamEvent::Frame(None) => {
                    self.on_close();
                }
                StreamEvent::Shutdown => {
                    info!("Shutdown signal received, closing connection to {}", self.endpoint);
                    if let Err(e) = self.close().await {
                        debug!("Close handshake did not complete: {}", e);
                    }
                }
            }
        }

        Ok(())
    }

    fn connection_label(&self) -> String {
        self.connection_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

impl<S: DisplaySink> fmt::Debug for StreamClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("endpoint", &self.endpoint)
            .field("element_id", &self.element_id)
            .field("state", &self.state)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}
