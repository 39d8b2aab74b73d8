//! # courier-transport
//!
//! Transport abstraction layer for the Courier messaging relay.
//!
//! The relay core is transport-agnostic: the server accepts connections
//! through the [`Transport`] trait, the client dials through
//! [`ClientTransport`], and both ends pump frames through split
//! [`FrameSink`] / [`FrameStream`] halves. Two implementations ship here:
//!
//! - **WebSocket** - tokio-tungstenite on both ends, with keepalive and an
//!   origin allow-list on the accepting side
//! - **Memory** - an in-process duplex pair for tests and embedded
//!   single-process deployments
//!
//! ```rust,ignore
//! use courier_transport::{Transport, Connection};
//!
//! async fn accept_loop(transport: &dyn Transport) {
//!     while let Ok(conn) = transport.accept().await {
//!         let (sink, stream) = conn.split();
//!         // drive the connection
//!     }
//! }
//! ```

pub mod fallback;
pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use fallback::{negotiate_transport, FallbackConnector};
pub use memory::{memory_transport, MemoryConnector, MemoryListener};
pub use traits::{
    ClientTransport, ConnectOptions, Connection, ConnectionId, FrameSink, FrameStream, Transport,
    TransportError,
};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
