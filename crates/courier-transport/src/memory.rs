//! In-process memory transport.
//!
//! A listener/connector pair joined by channels. Frames cross a pair of
//! unbounded queues with no encoding step; closing one direction surfaces
//! as a clean end-of-stream on the peer, mirroring a TCP half-close.
//!
//! The end-to-end tests run entire client/server topologies over this
//! transport, and embedded deployments can use it to host the relay and
//! its clients in one process.

use crate::traits::{
    ClientTransport, ConnectOptions, Connection, ConnectionId, FrameSink, FrameStream, Transport,
    TransportError,
};
use async_trait::async_trait;
use courier_protocol::Frame;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Create a joined listener/connector pair.
#[must_use]
pub fn memory_transport() -> (MemoryListener, MemoryConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryListener {
            incoming: Mutex::new(rx),
        },
        MemoryConnector { listener: tx },
    )
}

/// Accepting side of the memory transport.
pub struct MemoryListener {
    incoming: Mutex<mpsc::UnboundedReceiver<MemoryConnection>>,
}

/// Dialing side of the memory transport.
#[derive(Clone)]
pub struct MemoryConnector {
    listener: mpsc::UnboundedSender<MemoryConnection>,
}

/// One end of an in-process duplex connection.
pub struct MemoryConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Transport for MemoryListener {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let conn = self
            .incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)?;
        debug!(connection = %conn.id, "Accepted in-process connection");
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl ClientTransport for MemoryConnector {
    async fn connect(&self, _options: &ConnectOptions) -> Result<Box<dyn Connection>, TransportError> {
        let id = ConnectionId::generate();
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();

        let server_side = MemoryConnection {
            id: id.clone(),
            tx: server_tx,
            rx: server_rx,
        };
        self.listener
            .send(server_side)
            .map_err(|_| TransportError::NoTransport("memory listener dropped".into()))?;

        Ok(Box::new(MemoryConnection {
            id,
            tx: client_tx,
            rx: client_rx,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        (
            Box::new(MemorySink { tx: Some(self.tx) }),
            Box::new(MemoryStream { rx: self.rx }),
        )
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(frame).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the sender ends the peer's stream.
        self.tx = None;
        Ok(())
    }
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_the_pair() {
        let (listener, connector) = memory_transport();
        let opts = ConnectOptions::new("memory://local");

        let client = connector.connect(&opts).await.unwrap();
        let server = listener.accept().await.unwrap();
        assert_eq!(client.id(), server.id());

        let (mut client_sink, _client_stream) = client.split();
        let (_server_sink, mut server_stream) = server.split();

        client_sink.send(Frame::authenticate("t1")).await.unwrap();
        let frame = server_stream.recv().await.unwrap().unwrap();
        assert_eq!(frame, Frame::authenticate("t1"));
    }

    #[tokio::test]
    async fn test_close_surfaces_as_end_of_stream() {
        let (listener, connector) = memory_transport();
        let opts = ConnectOptions::new("memory://local");

        let client = connector.connect(&opts).await.unwrap();
        let server = listener.accept().await.unwrap();

        let (mut client_sink, _client_stream) = client.split();
        let (_server_sink, mut server_stream) = server.split();

        client_sink.close().await.unwrap();
        assert!(server_stream.recv().await.unwrap().is_none());
        assert!(matches!(
            client_sink.send(Frame::authenticate("t")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_connect_without_listener_fails() {
        let (listener, connector) = memory_transport();
        drop(listener);

        let result = connector.connect(&ConnectOptions::new("memory://local")).await;
        assert!(matches!(result, Err(TransportError::NoTransport(_))));
    }
}
