//! Server orchestrator.
//!
//! Wires transport connection lifecycle to registry mutation and to the
//! protocol handlers. Each accepted connection gets its own driver task
//! pumping three sources: the session's outbound command queue, inbound
//! frames, and the keepalive timer. Frame listeners run to completion
//! before the next inbound frame is dispatched, so handlers never race
//! each other within one session.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handlers::{
    AuthHandler, AuthValidator, MessagingHandler, PresenceHandler, ProtocolHandler,
};
use crate::metrics::{self, ConnectionMetricsGuard};
use courier_core::{Registry, Session, SessionCommand};
use courier_transport::{Connection, FrameSink, FrameStream, Transport, TransportError};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The relay server.
///
/// Built-in handlers are chosen by the configuration up front; custom
/// handlers may be registered before [`CourierServer::run`]. The registry
/// is owned here and handed to every handler by `Arc` at construction
/// time.
pub struct CourierServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    handlers: Vec<Arc<dyn ProtocolHandler>>,
    presence: Option<Arc<PresenceHandler>>,
}

impl CourierServer {
    /// Create a server from its configuration and an injected token
    /// validator.
    #[must_use]
    pub fn new(config: ServerConfig, validator: Arc<dyn AuthValidator>) -> Self {
        let registry = Arc::new(Registry::new());
        let mut handlers: Vec<Arc<dyn ProtocolHandler>> = Vec::new();

        if config.handlers.auth {
            handlers.push(Arc::new(AuthHandler::new(
                Arc::clone(&registry),
                validator,
            )));
        }
        let presence = config
            .handlers
            .presence
            .then(|| Arc::new(PresenceHandler::new(Arc::clone(&registry))));
        if let Some(p) = &presence {
            handlers.push(Arc::clone(p) as Arc<dyn ProtocolHandler>);
        }
        if config.handlers.messaging {
            handlers.push(Arc::new(MessagingHandler::new(Arc::clone(&registry))));
        }

        Self {
            config,
            registry,
            handlers,
            presence,
        }
    }

    /// The server's session registry.
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Register a custom protocol handler.
    ///
    /// Handlers attach to connections in registration order; built-ins come
    /// first. Must be called before [`CourierServer::run`].
    pub fn register_handler(&mut self, handler: Arc<dyn ProtocolHandler>) {
        self.handlers.push(handler);
    }

    /// Initialize handlers and accept connections until the transport shuts
    /// down.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler fails to initialize or the transport's
    /// listener dies.
    pub async fn run(self: Arc<Self>, transport: Arc<dyn Transport>) -> Result<(), ServerError> {
        for handler in &self.handlers {
            handler.initialize().await?;
            debug!(handler = handler.name(), "Handler initialized");
        }

        if self.config.metrics.enabled {
            if let Err(e) = metrics::start_metrics_server(self.config.metrics.port) {
                warn!(error = %e, "Failed to start metrics server");
            }
        }

        info!(transport = transport.name(), "Relay accepting connections");
        loop {
            match transport.accept().await {
                Ok(conn) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move { server.handle_connection(conn).await });
                }
                Err(TransportError::ConnectionClosed) => {
                    info!("Transport shut down");
                    return Ok(());
                }
                Err(e @ TransportError::Io(_)) => return Err(e.into()),
                Err(e) => {
                    // Handshake-level failure; keep accepting.
                    warn!(error = %e, "Accept failed");
                    metrics::record_error("accept");
                }
            }
        }
    }

    /// Drive one connection from registration to teardown.
    async fn handle_connection(&self, conn: Box<dyn Connection>) {
        let _metrics_guard = ConnectionMetricsGuard::new();
        let session_id = conn.id().to_string();
        let remote = conn.remote_addr();
        let (mut sink, mut stream) = conn.split();

        let (session, mut commands) = Session::new(session_id.as_str());
        self.registry.add(Arc::clone(&session));
        for handler in &self.handlers {
            handler.handle_connection(&session);
        }
        debug!(
            session = %session_id,
            remote = ?remote,
            sessions = self.registry.count(),
            "Connection established"
        );

        let mut keepalive = tokio::time::interval(self.config.keepalive.ping_interval());
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        keepalive.reset();

        loop {
            tokio::select! {
                biased;

                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Send(frame)) => {
                        metrics::record_message("outbound");
                        if let Err(e) = sink.send(frame).await {
                            debug!(session = %session_id, error = %e, "Send failed");
                            break;
                        }
                    }
                    Some(SessionCommand::Authenticated { user_id }) => {
                        if let Some(presence) = &self.presence {
                            presence.broadcast_online(&user_id);
                        }
                    }
                    Some(SessionCommand::Close) => {
                        let _ = sink.close().await;
                        break;
                    }
                    None => break,
                },

                res = stream.recv() => match res {
                    Ok(Some(frame)) => {
                        metrics::record_message("inbound");
                        session.dispatch(frame).await;
                    }
                    Ok(None) => {
                        debug!(session = %session_id, "Connection closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!(session = %session_id, error = %e, "Transport error");
                        metrics::record_error("transport");
                        break;
                    }
                },

                _ = keepalive.tick() => {
                    if sink.ping().await.is_err() {
                        debug!(session = %session_id, "Keepalive ping failed");
                        break;
                    }
                }
            }
        }

        let removed = self.registry.remove(&session_id);
        if let Some(user_id) = removed.and_then(|s| s.user_id()) {
            if let Some(presence) = &self.presence {
                presence.broadcast_offline(&user_id);
            }
        }
        debug!(
            session = %session_id,
            sessions = self.registry.count(),
            "Connection closed"
        );
    }
}
