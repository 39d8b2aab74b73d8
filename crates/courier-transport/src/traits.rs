//! Transport abstraction traits for Courier.
//!
//! These traits define the seam between the relay engine and the underlying
//! socket machinery. The engine never sees raw bytes: transports decode
//! inbound data into [`courier_protocol::Frame`] values and encode outbound
//! frames back out.

use async_trait::async_trait;
use courier_protocol::Frame;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::{SystemTime, UNIX_EPOCH};
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, seq))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] courier_protocol::ProtocolError),

    /// No configured transport could be used.
    #[error("No usable transport: {0}")]
    NoTransport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Options the client hands to its transport when dialing.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Server URL to dial.
    pub url: String,
    /// Connect timeout.
    pub timeout: Duration,
    /// Transport names in preference order (e.g. `["websocket", "polling"]`).
    pub transports: Vec<String>,
}

impl ConnectOptions {
    /// Create options for a URL with a 20 second timeout and the default
    /// transport preference list.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(20),
            transports: vec!["websocket".to_string(), "polling".to_string()],
        }
    }
}

/// A transport that can accept connections (server side).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept a new connection.
    ///
    /// Blocks until a new connection is available. `ConnectionClosed` means
    /// the transport itself has shut down and no further connections will
    /// arrive.
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g. "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// A transport that can dial a server (client side).
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Open a connection to the server named in `options`.
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g. "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// An active connection over a transport.
///
/// A connection is consumed by splitting it into its two directions, so the
/// read loop and the write pump can be driven independently.
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Split the connection into its outbound and inbound halves.
    fn split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameStream>);
}

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a frame to the peer.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send a transport-level keepalive probe, where the transport has one.
    async fn ping(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next frame from the peer.
    ///
    /// Returns `None` when the connection closed cleanly.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;
}
