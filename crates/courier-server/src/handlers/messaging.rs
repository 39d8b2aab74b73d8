//! Point-to-point messaging and typing indicators.

use crate::handlers::ProtocolHandler;
use crate::metrics;
use async_trait::async_trait;
use courier_core::{generate_message_id, now_millis, Registry, Session};
use courier_protocol::{Frame, FrameKind};
use std::sync::Arc;
use tracing::{debug, trace};

/// Handler for `send_message`, `typing_start`, and `typing_stop`.
///
/// Message failures are reported to the sender through `message_error`.
/// Typing failures are silent: the indicators are ephemeral, so nothing is
/// emitted to anyone when a typing request cannot be resolved.
pub struct MessagingHandler {
    registry: Arc<Registry>,
}

impl MessagingHandler {
    /// Create the handler over a registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    fn deliver(registry: &Registry, sender: &Arc<Session>, frame: Frame) {
        let Frame::SendMessage {
            to,
            content,
            metadata,
        } = frame
        else {
            return;
        };

        if registry.get(sender.id()).is_none() || !sender.is_authenticated() {
            sender.emit(Frame::message_error(None, "Not authenticated"));
            return;
        }

        let Some(from) = sender.user_id() else {
            // Authenticated without a user is an internal inconsistency.
            sender.emit(Frame::message_error(None, "Invalid user"));
            return;
        };

        let Some(recipient) = registry.get_by_user_id(&to) else {
            debug!(from = %from, to = %to, "Recipient offline");
            sender.emit(Frame::message_error(
                Some(generate_message_id()),
                "Recipient is offline",
            ));
            return;
        };

        let message_id = generate_message_id();
        debug!(from = %from, to = %to, message = message_id, "Delivering message");
        recipient.emit(Frame::ReceiveMessage {
            from,
            content,
            timestamp: now_millis(),
            message_id,
            metadata,
        });
        sender.emit(Frame::MessageDelivered { message_id });
        metrics::record_delivery();
    }

    fn relay_typing(registry: &Registry, sender: &Arc<Session>, to: Option<String>, start: bool) {
        // Every failure below is silent: nothing is emitted to anyone.
        let Some(to) = to else { return };
        if !sender.is_authenticated() {
            trace!(session = %sender.id(), "Typing from unauthenticated session dropped");
            return;
        }
        let Some(from) = sender.user_id() else { return };
        let Some(recipient) = registry.get_by_user_id(&to) else {
            return;
        };

        let frame = if start {
            Frame::TypingStart {
                to: None,
                from: Some(from),
            }
        } else {
            Frame::TypingStop {
                to: None,
                from: Some(from),
            }
        };
        recipient.emit(frame);
    }
}

#[async_trait]
impl ProtocolHandler for MessagingHandler {
    fn name(&self) -> &'static str {
        "messaging"
    }

    fn handle_connection(&self, session: &Arc<Session>) {
        let registry = Arc::clone(&self.registry);
        session.on(
            FrameKind::SendMessage,
            Arc::new(move |session, frame| {
                let registry = Arc::clone(&registry);
                Box::pin(async move {
                    Self::deliver(&registry, &session, frame);
                    Ok(())
                })
            }),
        );

        let registry = Arc::clone(&self.registry);
        session.on(
            FrameKind::TypingStart,
            Arc::new(move |session, frame| {
                let registry = Arc::clone(&registry);
                Box::pin(async move {
                    if let Frame::TypingStart { to, .. } = frame {
                        Self::relay_typing(&registry, &session, to, true);
                    }
                    Ok(())
                })
            }),
        );

        let registry = Arc::clone(&self.registry);
        session.on(
            FrameKind::TypingStop,
            Arc::new(move |session, frame| {
                let registry = Arc::clone(&registry);
                Box::pin(async move {
                    if let Frame::TypingStop { to, .. } = frame {
                        Self::relay_typing(&registry, &session, to, false);
                    }
                    Ok(())
                })
            }),
        );
    }
}
