//! Semantic client events.
//!
//! The orchestrator translates transport activity and inbound frames into
//! these events and publishes them through [`EventBus`]. Application code
//! subscribes per event kind with a typed payload, never an untyped
//! argument list.

use courier_core::dispatcher::{Dispatcher, HandlerError, SubscriptionId, SyncHandler};
use courier_protocol::MessageId;
use std::collections::HashMap;
use std::sync::Arc;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The application called `disconnect()`. Terminal; reconnection never
    /// resumes after this.
    Client,
    /// The server closed the connection.
    Server,
    /// The transport failed.
    Transport,
}

/// Discriminant for a [`ClientEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEventKind {
    Connect,
    Disconnect,
    Error,
    Authenticated,
    AuthError,
    OnlineStatus,
    UserOnline,
    UserOffline,
    MessageReceived,
    MessageDelivered,
    MessageError,
    TypingStarted,
    TypingStopped,
}

/// An event published to application code.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The transport connection opened.
    Connect,
    /// The transport connection closed.
    Disconnect {
        /// Why the connection ended.
        reason: DisconnectReason,
    },
    /// The transport failed.
    Error {
        /// Failure description.
        message: String,
    },
    /// The authentication handshake succeeded.
    Authenticated {
        /// Identity the server bound this session to.
        user_id: String,
        /// Server-side session id.
        session_id: String,
    },
    /// The authentication handshake failed. The server closes the session.
    AuthError {
        /// Failure description.
        message: String,
    },
    /// Response to an online-status query.
    OnlineStatus {
        /// Online flag for every queried user id.
        statuses: HashMap<String, bool>,
    },
    /// A user came online.
    UserOnline {
        /// The user that came online.
        user_id: String,
    },
    /// A user went offline.
    UserOffline {
        /// The user that went offline.
        user_id: String,
    },
    /// A message arrived.
    MessageReceived {
        /// Sender user id.
        from: String,
        /// Message body.
        content: String,
        /// Server processing timestamp, milliseconds since the Unix epoch.
        timestamp: u64,
        /// Identifier shared with the sender's confirmation.
        message_id: MessageId,
        /// Opaque application metadata.
        metadata: Option<serde_json::Value>,
    },
    /// A sent message reached its recipient.
    MessageDelivered {
        /// Identifier of the delivered message.
        message_id: MessageId,
    },
    /// A sent message could not be delivered.
    MessageError {
        /// Identifier of the failed message, when one was assigned.
        message_id: Option<MessageId>,
        /// Failure description.
        error: String,
    },
    /// A peer started typing.
    TypingStarted {
        /// The typing user.
        from: String,
    },
    /// A peer stopped typing.
    TypingStopped {
        /// The user that stopped typing.
        from: String,
    },
}

impl ClientEvent {
    /// Get the event's discriminant.
    #[must_use]
    pub fn kind(&self) -> ClientEventKind {
        match self {
            ClientEvent::Connect => ClientEventKind::Connect,
            ClientEvent::Disconnect { .. } => ClientEventKind::Disconnect,
            ClientEvent::Error { .. } => ClientEventKind::Error,
            ClientEvent::Authenticated { .. } => ClientEventKind::Authenticated,
            ClientEvent::AuthError { .. } => ClientEventKind::AuthError,
            ClientEvent::OnlineStatus { .. } => ClientEventKind::OnlineStatus,
            ClientEvent::UserOnline { .. } => ClientEventKind::UserOnline,
            ClientEvent::UserOffline { .. } => ClientEventKind::UserOffline,
            ClientEvent::MessageReceived { .. } => ClientEventKind::MessageReceived,
            ClientEvent::MessageDelivered { .. } => ClientEventKind::MessageDelivered,
            ClientEvent::MessageError { .. } => ClientEventKind::MessageError,
            ClientEvent::TypingStarted { .. } => ClientEventKind::TypingStarted,
            ClientEvent::TypingStopped { .. } => ClientEventKind::TypingStopped,
        }
    }
}

/// Typed event bus between the orchestrator and application code.
pub struct EventBus {
    inner: Dispatcher<ClientEventKind, SyncHandler<ClientEvent>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Dispatcher::new(),
        }
    }

    /// Subscribe a handler for one event kind.
    ///
    /// Handlers for the same kind run in registration order; a failing
    /// handler is logged and does not prevent its siblings from running.
    pub fn on<F>(&self, kind: ClientEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.subscribe(kind, Arc::new(handler))
    }

    /// Remove exactly the handler identified by `id`.
    pub fn off(&self, kind: ClientEventKind, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(&kind, id)
    }

    /// Remove all handlers for one kind, or every handler when `None`.
    pub fn clear(&self, kind: Option<ClientEventKind>) {
        self.inner.unsubscribe_all(kind.as_ref());
    }

    /// Publish an event. No subscribers is a no-op.
    pub fn publish(&self, event: &ClientEvent) {
        self.inner.publish(&event.kind(), event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_publish_reaches_matching_kind_only() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen2 = Arc::clone(&seen);
        bus.on(ClientEventKind::Connect, move |event| {
            seen2.lock().unwrap().push(event.clone());
            Ok(())
        });
        bus.on(ClientEventKind::Disconnect, |_| {
            panic!("wrong kind delivered")
        });

        bus.publish(&ClientEvent::Connect);
        assert_eq!(*seen.lock().unwrap(), vec![ClientEvent::Connect]);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(&ClientEvent::Connect);
    }
}
