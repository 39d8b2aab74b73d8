//! Client session orchestrator.
//!
//! [`CourierClient`] binds transport lifecycle events to the connection
//! state machine, performs the authentication handshake, exposes the
//! message/presence/typing operations, and runs the reconnection loop.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::event::{ClientEvent, ClientEventKind, DisconnectReason, EventBus};
use crate::session::{ConnectionState, ListenerId, SessionState};
use courier_core::dispatcher::{HandlerError, SubscriptionId};
use courier_protocol::Frame;
use courier_transport::{ClientTransport, ConnectOptions, Connection, FrameSink, FrameStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Delay before reconnection attempt `attempt`: linear backoff, not
/// exponential.
#[must_use]
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

/// Commands consumed by the connection driver.
enum ClientCommand {
    Send(Frame),
    Close,
}

/// How a connection driver ended.
enum DriveEnd {
    /// The application closed the connection.
    Client,
    /// The remote end closed the connection.
    Remote,
    /// The transport failed.
    Failed(String),
}

/// A scheduled reconnection attempt.
///
/// Holding the handle keeps cancellation explicit: an explicit disconnect
/// aborts the pending attempt instead of racing it.
struct ReconnectTask {
    attempt: u32,
    handle: JoinHandle<()>,
}

impl ReconnectTask {
    fn cancel(self) {
        debug!(attempt = self.attempt, "Reconnect cancelled");
        self.handle.abort();
    }
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn ClientTransport>,
    state: SessionState,
    events: EventBus,
    user_id: Mutex<Option<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientCommand>>>,
    reconnect: Mutex<Option<ReconnectTask>>,
    closing: AtomicBool,
}

/// Client SDK handle. Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct CourierClient {
    inner: Arc<ClientInner>,
}

impl CourierClient {
    /// Create a client over the given transport.
    ///
    /// With `auto_connect` enabled (the default) the first connect attempt
    /// is spawned immediately; call from within a Tokio runtime.
    #[must_use]
    pub fn new(transport: Arc<dyn ClientTransport>, config: ClientConfig) -> Self {
        let auto_connect = config.auto_connect;
        let client = Self {
            inner: Arc::new(ClientInner {
                state: SessionState::new(config.reconnection_attempts),
                events: EventBus::new(),
                user_id: Mutex::new(None),
                outbound: Mutex::new(None),
                reconnect: Mutex::new(None),
                closing: AtomicBool::new(false),
                transport,
                config,
            }),
        };
        if auto_connect {
            let background = client.clone();
            tokio::spawn(async move {
                if let Err(e) = background.connect().await {
                    debug!(error = %e, "Auto-connect failed");
                }
            });
        }
        client
    }

    /// Open the transport connection.
    ///
    /// A no-op when already connected. On success the state machine moves
    /// to `Connected`, the attempt counter resets, and a `Connect` event is
    /// published. On failure the transport-error path runs, which schedules
    /// a reconnect when reconnection is enabled.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.inner.state.is_connected() {
            warn!("connect() called while already connected");
            return Ok(());
        }
        self.inner.closing.store(false, Ordering::SeqCst);
        self.inner.state.set_state(ConnectionState::Connecting);

        let options = ConnectOptions {
            url: self.inner.config.url.clone(),
            timeout: self.inner.config.timeout,
            transports: self.inner.config.transports.clone(),
        };
        let dial = self.inner.transport.connect(&options);
        let conn = match tokio::time::timeout(self.inner.config.timeout, dial).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                self.handle_transport_failure(&e.to_string());
                return Err(e.into());
            }
            Err(_) => {
                self.handle_transport_failure("connect timed out");
                return Err(ClientError::Timeout);
            }
        };

        debug!(connection = %conn.id(), "Transport open");
        let (sink, stream) = conn.split();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.outbound.lock().expect("outbound lock poisoned") = Some(tx.clone());

        self.inner.state.set_state(ConnectionState::Connected);
        self.inner.state.reset_reconnect_attempts();
        self.inner.events.publish(&ClientEvent::Connect);

        let driver = self.clone();
        tokio::spawn(async move { driver.drive(sink, stream, rx, tx).await });
        Ok(())
    }

    /// Close the connection and tear the client session down.
    ///
    /// Cancels any pending reconnect, closes the transport, resets the
    /// state machine (clearing its listeners), and clears the cached user
    /// id. Terminal: reconnection never resumes after an explicit
    /// disconnect.
    pub fn disconnect(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        if let Some(task) = self
            .inner
            .reconnect
            .lock()
            .expect("reconnect lock poisoned")
            .take()
        {
            task.cancel();
        }
        let sender = self
            .inner
            .outbound
            .lock()
            .expect("outbound lock poisoned")
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(ClientCommand::Close);
        }
        self.clear_user();
        self.inner.state.reset();
    }

    /// Start the authentication handshake.
    ///
    /// Non-blocking: the outcome arrives as an `Authenticated` or
    /// `AuthError` event.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when no connection is open.
    pub fn authenticate(&self, token: impl Into<String>) -> Result<(), ClientError> {
        if !self.inner.state.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.send_frame(Frame::authenticate(token.into()))
    }

    /// Send a point-to-point message.
    ///
    /// Delivery confirmation or failure arrives asynchronously as a
    /// `MessageDelivered` or `MessageError` event.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotAuthenticated`] before the handshake has
    /// completed.
    pub fn send_message(
        &self,
        to: impl Into<String>,
        content: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), ClientError> {
        if !self.inner.state.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        self.send_frame(Frame::send_message(to.into(), content.into(), metadata))
    }

    /// Signal that this user started typing toward `to`.
    ///
    /// Fire-and-forget: a no-op when not authenticated, and no response is
    /// ever expected.
    pub fn start_typing(&self, to: impl Into<String>) {
        if !self.inner.state.is_authenticated() {
            return;
        }
        let _ = self.send_frame(Frame::typing_start_to(to.into()));
    }

    /// Signal that this user stopped typing toward `to`.
    ///
    /// Fire-and-forget, like [`CourierClient::start_typing`].
    pub fn stop_typing(&self, to: impl Into<String>) {
        if !self.inner.state.is_authenticated() {
            return;
        }
        let _ = self.send_frame(Frame::typing_stop_to(to.into()));
    }

    /// Query online status for a set of users.
    ///
    /// The result arrives as an `OnlineStatus` event.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when no connection is open.
    pub fn get_online_status(&self, user_ids: Vec<String>) -> Result<(), ClientError> {
        if !self.inner.state.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.send_frame(Frame::get_online_status(user_ids))
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.state()
    }

    /// True while the transport is usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    /// True once authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.is_authenticated()
    }

    /// The authenticated user id, when known.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.inner.user_id.lock().expect("user lock poisoned").clone()
    }

    /// Subscribe to a semantic event.
    pub fn on<F>(&self, kind: ClientEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    /// Remove an event subscription.
    pub fn off(&self, kind: ClientEventKind, id: SubscriptionId) -> bool {
        self.inner.events.off(kind, id)
    }

    /// The underlying event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Observe connection-state transitions.
    pub fn on_state_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConnectionState) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.state.on_state_change(listener)
    }

    /// Remove a state-change listener.
    pub fn remove_state_listener(&self, id: ListenerId) -> bool {
        self.inner.state.remove_listener(id)
    }

    fn clear_user(&self) {
        *self.inner.user_id.lock().expect("user lock poisoned") = None;
    }

    fn send_frame(&self, frame: Frame) -> Result<(), ClientError> {
        let guard = self.inner.outbound.lock().expect("outbound lock poisoned");
        let tx = guard.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(ClientCommand::Send(frame))
            .map_err(|_| ClientError::NotConnected)
    }

    /// Transport error path: surface the failure and, when reconnection is
    /// enabled, schedule an attempt regardless of the failure's shape.
    fn handle_transport_failure(&self, message: &str) {
        self.inner.state.set_state(ConnectionState::Error);
        self.inner.events.publish(&ClientEvent::Error {
            message: message.to_string(),
        });
        if self.inner.config.reconnection && !self.inner.closing.load(Ordering::SeqCst) {
            self.schedule_reconnect();
        }
    }

    /// Schedule the next reconnection attempt.
    ///
    /// Any pending attempt is cancelled first. When the attempt bound is
    /// exhausted no timer is scheduled and the state stays wherever the
    /// last transition left it.
    fn schedule_reconnect(&self) {
        let mut pending = self
            .inner
            .reconnect
            .lock()
            .expect("reconnect lock poisoned");
        if let Some(task) = pending.take() {
            task.cancel();
        }
        if !self.inner.state.can_reconnect() {
            warn!(
                attempts = self.inner.state.reconnect_attempts(),
                "Reconnect attempts exhausted"
            );
            return;
        }

        let attempt = self.inner.state.increment_reconnect_attempts();
        let delay = reconnect_delay(self.inner.config.reconnection_delay, attempt);
        self.inner.state.set_state(ConnectionState::Reconnecting);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        let client = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if client.inner.closing.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = client.connect().await {
                debug!(attempt, error = %e, "Reconnect attempt failed");
            }
        });
        *pending = Some(ReconnectTask { attempt, handle });
    }

    /// Pump one open connection until it ends, then run the matching
    /// lifecycle transition.
    async fn drive(
        self,
        mut sink: Box<dyn FrameSink>,
        mut stream: Box<dyn FrameStream>,
        mut rx: mpsc::UnboundedReceiver<ClientCommand>,
        tx: mpsc::UnboundedSender<ClientCommand>,
    ) {
        let end = loop {
            tokio::select! {
                biased;

                cmd = rx.recv() => match cmd {
                    Some(ClientCommand::Send(frame)) => {
                        if let Err(e) = sink.send(frame).await {
                            break DriveEnd::Failed(e.to_string());
                        }
                    }
                    Some(ClientCommand::Close) | None => {
                        let _ = sink.close().await;
                        break DriveEnd::Client;
                    }
                },

                res = stream.recv() => match res {
                    Ok(Some(frame)) => self.handle_frame(frame),
                    Ok(None) => break DriveEnd::Remote,
                    Err(e) => break DriveEnd::Failed(e.to_string()),
                },
            }
        };

        // Retire this connection's sender unless a newer connection has
        // already replaced it.
        {
            let mut guard = self.inner.outbound.lock().expect("outbound lock poisoned");
            if guard.as_ref().is_some_and(|current| current.same_channel(&tx)) {
                *guard = None;
            }
        }

        let closing = self.inner.closing.load(Ordering::SeqCst);
        match end {
            DriveEnd::Client => {
                self.inner.state.set_state(ConnectionState::Disconnected);
                self.clear_user();
                self.inner.events.publish(&ClientEvent::Disconnect {
                    reason: DisconnectReason::Client,
                });
            }
            DriveEnd::Remote => {
                debug!("Connection closed by remote");
                self.inner.state.set_state(ConnectionState::Disconnected);
                self.clear_user();
                self.inner.events.publish(&ClientEvent::Disconnect {
                    reason: DisconnectReason::Server,
                });
                if self.inner.config.reconnection && !closing {
                    self.schedule_reconnect();
                }
            }
            DriveEnd::Failed(message) => {
                warn!(error = %message, "Transport failed");
                self.handle_transport_failure(&message);
            }
        }
    }

    /// Translate an inbound frame into state updates and semantic events.
    fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Authenticated {
                user_id,
                session_id,
            } => {
                *self.inner.user_id.lock().expect("user lock poisoned") = Some(user_id.clone());
                self.inner.state.set_state(ConnectionState::Authenticated);
                self.inner.events.publish(&ClientEvent::Authenticated {
                    user_id,
                    session_id,
                });
            }
            Frame::AuthError { message } => {
                self.inner.events.publish(&ClientEvent::AuthError { message });
            }
            Frame::OnlineStatus { statuses } => {
                self.inner.events.publish(&ClientEvent::OnlineStatus { statuses });
            }
            Frame::UserOnline { user_id } => {
                self.inner.events.publish(&ClientEvent::UserOnline { user_id });
            }
            Frame::UserOffline { user_id } => {
                self.inner.events.publish(&ClientEvent::UserOffline { user_id });
            }
            Frame::ReceiveMessage {
                from,
                content,
                timestamp,
                message_id,
                metadata,
            } => {
                self.inner.events.publish(&ClientEvent::MessageReceived {
                    from,
                    content,
                    timestamp,
                    message_id,
                    metadata,
                });
            }
            Frame::MessageDelivered { message_id } => {
                self.inner
                    .events
                    .publish(&ClientEvent::MessageDelivered { message_id });
            }
            Frame::MessageError { message_id, error } => {
                self.inner
                    .events
                    .publish(&ClientEvent::MessageError { message_id, error });
            }
            Frame::TypingStart { from: Some(from), .. } => {
                self.inner.events.publish(&ClientEvent::TypingStarted { from });
            }
            Frame::TypingStop { from: Some(from), .. } => {
                self.inner.events.publish(&ClientEvent::TypingStopped { from });
            }
            other => {
                warn!(kind = ?other.kind(), "Unexpected frame from server");
            }
        }
    }
}
