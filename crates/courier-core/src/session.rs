//! Per-connection session handle.
//!
//! A `Session` wraps one live transport connection on the server: its stable
//! id, its authentication state, an ordered outbound command queue drained
//! by the connection driver, and the listener table protocol handlers attach
//! to.

use crate::dispatcher::{Dispatcher, HandlerError, SubscriptionId};
use crate::user::User;
use courier_protocol::{Frame, FrameKind};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Stable identifier of one live transport connection.
pub type SessionId = String;

/// Commands consumed by the per-connection driver.
///
/// A single ordered queue carries both frames and control items so that,
/// for example, an auth failure response is flushed before the forced
/// close that follows it.
#[derive(Debug)]
pub enum SessionCommand {
    /// Deliver a frame to the connected client.
    Send(Frame),
    /// The session completed authentication; the orchestrator reacts by
    /// broadcasting presence.
    Authenticated {
        /// The user the session now belongs to.
        user_id: String,
    },
    /// Close the underlying connection.
    Close,
}

/// Future returned by a frame listener.
pub type ListenerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// Async callback attached to a session for one frame kind.
pub type FrameListener = Arc<dyn Fn(Arc<Session>, Frame) -> ListenerFuture + Send + Sync>;

/// One live transport connection, server-side.
pub struct Session {
    id: SessionId,
    user: Mutex<Option<User>>,
    authenticated: AtomicBool,
    commands: mpsc::UnboundedSender<SessionCommand>,
    listeners: Dispatcher<FrameKind, FrameListener>,
}

impl Session {
    /// Create a session handle and the command receiver its driver drains.
    #[must_use]
    pub fn new(id: impl Into<SessionId>) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: id.into(),
            user: Mutex::new(None),
            authenticated: AtomicBool::new(false),
            commands,
            listeners: Dispatcher::new(),
        });
        (session, rx)
    }

    /// The session's stable id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the session has completed authentication.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// The authenticated user, if any.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.user.lock().expect("session lock poisoned").clone()
    }

    /// The authenticated user's id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.user
            .lock()
            .expect("session lock poisoned")
            .as_ref()
            .map(|u| u.id.clone())
    }

    /// Bind an authenticated user to this session.
    ///
    /// Only the registry calls this, keeping session state and the user
    /// index consistent.
    pub(crate) fn set_authenticated_user(&self, user: User) {
        *self.user.lock().expect("session lock poisoned") = Some(user);
        self.authenticated.store(true, Ordering::SeqCst);
    }

    /// Queue a frame for delivery to the connected client.
    ///
    /// Emitting after the driver has gone away is silently dropped; the
    /// session is being torn down.
    pub fn emit(&self, frame: Frame) {
        if self.commands.send(SessionCommand::Send(frame)).is_err() {
            debug!(session = %self.id, "Emit after session closed");
        }
    }

    /// Request the driver close the underlying connection.
    ///
    /// Frames already queued are flushed first.
    pub fn close(&self) {
        if self.commands.send(SessionCommand::Close).is_err() {
            debug!(session = %self.id, "Close after session closed");
        }
    }

    /// Raise the authenticated notice toward the orchestrator.
    pub fn notify_authenticated(&self, user_id: impl Into<String>) {
        let command = SessionCommand::Authenticated {
            user_id: user_id.into(),
        };
        if self.commands.send(command).is_err() {
            debug!(session = %self.id, "Authenticated notice after session closed");
        }
    }

    /// Attach a listener for one frame kind.
    ///
    /// Listeners for the same kind run in registration order.
    pub fn on(&self, kind: FrameKind, listener: FrameListener) -> SubscriptionId {
        self.listeners.subscribe(kind, listener)
    }

    /// Dispatch an inbound frame to the attached listeners.
    ///
    /// Listeners run sequentially; a failing listener is logged and does not
    /// prevent the remaining listeners from running. A frame nobody listens
    /// for is dropped silently.
    pub async fn dispatch(self: &Arc<Self>, frame: Frame) {
        let kind = frame.kind();
        let listeners = self.listeners.snapshot(&kind);
        if listeners.is_empty() {
            trace!(session = %self.id, kind = ?kind, "Frame without listener");
            return;
        }
        for listener in listeners {
            if let Err(e) = listener(Arc::clone(self), frame.clone()).await {
                warn!(session = %self.id, kind = ?kind, error = %e, "Frame listener failed");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
