//! WebSocket transport implementation.
//!
//! Both directions are provided: [`WebSocketTransport`] accepts connections
//! server-side, [`WebSocketConnector`] dials from a client. The protocol
//! version is negotiated as a WebSocket subprotocol during the HTTP
//! upgrade, and the accepting side can enforce an origin allow-list.

use async_trait::async_trait;
use bytes::BytesMut;
use courier_protocol::{codec, Frame, Version, PROTOCOL_VERSION};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async, connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::traits::{
    ClientTransport, ConnectOptions, Connection, ConnectionId, FrameSink, FrameStream, Transport,
    TransportError,
};

/// WebSocket transport configuration (accepting side).
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
    /// Origins allowed during the HTTP upgrade. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    /// How long the connection may stay silent (no frames, no pongs) before
    /// it is considered dead. `None` disables the check.
    pub idle_timeout: Option<Duration>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".parse().unwrap(),
            max_message_size: 64 * 1024,
            allowed_origins: Vec::new(),
            idle_timeout: Some(Duration::from_millis(60_000)),
        }
    }
}

/// WebSocket transport (accepting side).
pub struct WebSocketTransport {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn new(config: WebSocketConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(TransportError::Io)?;

        info!("WebSocket transport listening on {}", config.bind_addr);

        Ok(Self { listener, config })
    }

    /// Create a new WebSocket transport with default config.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        Self::new(WebSocketConfig {
            bind_addr: addr,
            ..Default::default()
        })
        .await
    }

    /// Get the local address this transport is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

/// Upgrade callback: enforce the origin allow-list and pick a compatible
/// subprotocol when the client offered one.
fn upgrade_callback(
    allowed_origins: Vec<String>,
) -> impl FnOnce(&Request, Response) -> Result<Response, ErrorResponse> {
    move |request, mut response| {
        if !allowed_origins.is_empty() {
            let origin = request
                .headers()
                .get("Origin")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !allowed_origins.iter().any(|allowed| allowed == origin) {
                warn!(origin = %origin, "Rejected upgrade from disallowed origin");
                let mut forbidden = ErrorResponse::new(None);
                *forbidden.status_mut() = StatusCode::FORBIDDEN;
                return Err(forbidden);
            }
        }

        if let Some(offered) = request
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|v| v.to_str().ok())
        {
            let compatible = offered
                .split(',')
                .map(str::trim)
                .find(|candidate| {
                    Version::from_subprotocol(candidate)
                        .is_some_and(|v| v.is_compatible_with(&PROTOCOL_VERSION))
                });
            match compatible {
                Some(subprotocol) => {
                    if let Ok(value) = HeaderValue::from_str(subprotocol) {
                        response
                            .headers_mut()
                            .insert("Sec-WebSocket-Protocol", value);
                    }
                }
                None => {
                    warn!(offered = %offered, "Rejected upgrade with incompatible protocol version");
                    let mut bad = ErrorResponse::new(None);
                    *bad.status_mut() = StatusCode::BAD_REQUEST;
                    return Err(bad);
                }
            }
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, addr) = self.listener.accept().await.map_err(TransportError::Io)?;

        debug!("Accepted TCP connection from {}", addr);

        let callback = upgrade_callback(self.config.allowed_origins.clone());
        let ws_stream = accept_hdr_async(stream, callback).await.map_err(|e| {
            TransportError::Other(format!("WebSocket handshake failed: {}", e))
        })?;

        debug!("WebSocket handshake completed with {}", addr);

        Ok(Box::new(WsConnection {
            id: ConnectionId::generate(),
            stream: ws_stream,
            remote_addr: Some(addr.to_string()),
            max_message_size: self.config.max_message_size,
            idle_timeout: self.config.idle_timeout,
        }))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// WebSocket transport (dialing side).
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl WebSocketConnector {
    /// Create a connector with a 64 KiB message size bound.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: 64 * 1024,
        }
    }
}

#[async_trait]
impl ClientTransport for WebSocketConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, TransportError> {
        let mut request = options
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Other(format!("Invalid URL: {}", e)))?;
        let subprotocol = PROTOCOL_VERSION.subprotocol();
        if let Ok(value) = HeaderValue::from_str(&subprotocol) {
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", value);
        }

        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Other(format!("WebSocket connect failed: {}", e)))?;

        debug!(url = %options.url, "WebSocket connected");

        Ok(Box::new(WsConnection {
            id: ConnectionId::generate(),
            stream: ws_stream,
            remote_addr: Some(options.url.clone()),
            max_message_size: self.max_message_size,
            idle_timeout: None,
        }))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A WebSocket connection, either direction.
struct WsConnection<S> {
    id: ConnectionId,
    stream: WebSocketStream<S>,
    remote_addr: Option<String>,
    max_message_size: usize,
    idle_timeout: Option<Duration>,
}

impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }

    fn split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        let (sink, stream) = self.stream.split();
        (
            Box::new(WsSink { sink }),
            Box::new(WsStream {
                stream,
                read_buffer: BytesMut::with_capacity(4096),
                max_message_size: self.max_message_size,
                idle_timeout: self.idle_timeout,
            }),
        )
    }
}

struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let data = codec::encode(&frame)?;
        self.sink
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }
}

struct WsStream<S> {
    stream: SplitStream<WebSocketStream<S>>,
    read_buffer: BytesMut,
    max_message_size: usize,
    idle_timeout: Option<Duration>,
}

#[async_trait]
impl<S> FrameStream for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        // Drain any frame already buffered.
        if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
            return Ok(Some(frame));
        }

        loop {
            let next = match self.idle_timeout {
                Some(limit) => timeout(limit, self.stream.next())
                    .await
                    .map_err(|_| TransportError::Timeout)?,
                None => self.stream.next().await,
            };

            match next {
                Some(Ok(Message::Binary(data))) => {
                    if data.len() > self.max_message_size {
                        warn!(
                            "Message too large: {} bytes (max: {})",
                            data.len(),
                            self.max_message_size
                        );
                        return Err(TransportError::Protocol(
                            courier_protocol::codec::ProtocolError::FrameTooLarge(data.len()),
                        ));
                    }

                    self.read_buffer.extend_from_slice(&data);
                    if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
                        return Ok(Some(frame));
                    }
                    // Partial frame, keep reading.
                }
                Some(Ok(Message::Text(text))) => {
                    // For compatibility, treat text as binary.
                    self.read_buffer.extend_from_slice(text.as_bytes());
                    if let Some(frame) = codec::decode_from(&mut self.read_buffer)? {
                        return Ok(Some(frame));
                    }
                }
                // tungstenite answers pings itself; both directions count
                // as liveness, which is all the idle timer needs.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}

/// The stream type produced when dialing.
pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
