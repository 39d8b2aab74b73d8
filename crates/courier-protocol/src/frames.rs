//! Frame types for the Courier wire protocol.
//!
//! Each frame corresponds to one named event on the wire. Frames are
//! serialized with MessagePack; the `type` tag carries the event name and
//! payload keys use camelCase, matching the documented data contracts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A unique per-delivery message identifier.
pub type MessageId = u64;

/// Discriminant for a [`Frame`], used to key per-event listener tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Authenticate,
    Authenticated,
    AuthError,
    GetOnlineStatus,
    OnlineStatus,
    UserOnline,
    UserOffline,
    SendMessage,
    ReceiveMessage,
    MessageDelivered,
    MessageError,
    TypingStart,
    TypingStop,
}

/// A protocol frame.
///
/// Direction is implied by the variant: requests flow client to server,
/// responses and broadcasts flow server to client. `TypingStart` and
/// `TypingStop` are the exception and travel both ways: the client names a
/// recipient in `to`, the relayed copy names the sender in `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Frame {
    /// Login request carrying an opaque credential.
    Authenticate {
        /// Token to be checked by the server's validator.
        token: String,
    },

    /// Successful login response.
    Authenticated {
        /// Identity the token resolved to.
        user_id: String,
        /// Transport session now bound to that identity.
        session_id: String,
    },

    /// Failed login response. The server closes the session after sending it.
    AuthError {
        /// Human-readable failure description.
        message: String,
    },

    /// Presence query for a set of users.
    GetOnlineStatus {
        /// User ids to look up.
        user_ids: Vec<String>,
    },

    /// Presence query response.
    OnlineStatus {
        /// Online flag for every requested user id.
        statuses: HashMap<String, bool>,
    },

    /// Broadcast: a user completed authentication.
    UserOnline {
        /// The user that came online.
        user_id: String,
    },

    /// Broadcast: an authenticated user's session ended.
    UserOffline {
        /// The user that went offline.
        user_id: String,
    },

    /// Point-to-point message submission.
    SendMessage {
        /// Recipient user id.
        to: String,
        /// Message body.
        content: String,
        /// Opaque application metadata.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        metadata: Option<serde_json::Value>,
    },

    /// Message delivery to the recipient.
    ReceiveMessage {
        /// Sender user id.
        from: String,
        /// Message body.
        content: String,
        /// Milliseconds since the Unix epoch, stamped at processing time.
        timestamp: u64,
        /// Identifier shared with the sender's delivery confirmation.
        message_id: MessageId,
        /// Opaque application metadata.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        metadata: Option<serde_json::Value>,
    },

    /// Delivery confirmation to the sender.
    MessageDelivered {
        /// Identifier of the delivered message.
        message_id: MessageId,
    },

    /// Delivery failure report to the sender.
    MessageError {
        /// Identifier of the failed message, when one was assigned.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        message_id: Option<MessageId>,
        /// Failure description.
        error: String,
    },

    /// Typing indicator: started.
    TypingStart {
        /// Recipient user id (client to server only).
        #[serde(skip_serializing_if = "Option::is_none", default)]
        to: Option<String>,
        /// Sender user id (server to recipient only).
        #[serde(skip_serializing_if = "Option::is_none", default)]
        from: Option<String>,
    },

    /// Typing indicator: stopped.
    TypingStop {
        /// Recipient user id (client to server only).
        #[serde(skip_serializing_if = "Option::is_none", default)]
        to: Option<String>,
        /// Sender user id (server to recipient only).
        #[serde(skip_serializing_if = "Option::is_none", default)]
        from: Option<String>,
    },
}

impl Frame {
    /// Get the frame's discriminant.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Authenticate { .. } => FrameKind::Authenticate,
            Frame::Authenticated { .. } => FrameKind::Authenticated,
            Frame::AuthError { .. } => FrameKind::AuthError,
            Frame::GetOnlineStatus { .. } => FrameKind::GetOnlineStatus,
            Frame::OnlineStatus { .. } => FrameKind::OnlineStatus,
            Frame::UserOnline { .. } => FrameKind::UserOnline,
            Frame::UserOffline { .. } => FrameKind::UserOffline,
            Frame::SendMessage { .. } => FrameKind::SendMessage,
            Frame::ReceiveMessage { .. } => FrameKind::ReceiveMessage,
            Frame::MessageDelivered { .. } => FrameKind::MessageDelivered,
            Frame::MessageError { .. } => FrameKind::MessageError,
            Frame::TypingStart { .. } => FrameKind::TypingStart,
            Frame::TypingStop { .. } => FrameKind::TypingStop,
        }
    }

    /// Create a new Authenticate frame.
    #[must_use]
    pub fn authenticate(token: impl Into<String>) -> Self {
        Frame::Authenticate {
            token: token.into(),
        }
    }

    /// Create a new Authenticated frame.
    #[must_use]
    pub fn authenticated(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Frame::Authenticated {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Create a new AuthError frame.
    #[must_use]
    pub fn auth_error(message: impl Into<String>) -> Self {
        Frame::AuthError {
            message: message.into(),
        }
    }

    /// Create a new GetOnlineStatus frame.
    #[must_use]
    pub fn get_online_status(user_ids: Vec<String>) -> Self {
        Frame::GetOnlineStatus { user_ids }
    }

    /// Create a new SendMessage frame.
    #[must_use]
    pub fn send_message(
        to: impl Into<String>,
        content: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Frame::SendMessage {
            to: to.into(),
            content: content.into(),
            metadata,
        }
    }

    /// Create a new MessageError frame.
    #[must_use]
    pub fn message_error(message_id: Option<MessageId>, error: impl Into<String>) -> Self {
        Frame::MessageError {
            message_id,
            error: error.into(),
        }
    }

    /// Create a client-side TypingStart frame addressed to a recipient.
    #[must_use]
    pub fn typing_start_to(to: impl Into<String>) -> Self {
        Frame::TypingStart {
            to: Some(to.into()),
            from: None,
        }
    }

    /// Create a client-side TypingStop frame addressed to a recipient.
    #[must_use]
    pub fn typing_stop_to(to: impl Into<String>) -> Self {
        Frame::TypingStop {
            to: Some(to.into()),
            from: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_kind() {
        let auth = Frame::authenticate("t1");
        assert_eq!(auth.kind(), FrameKind::Authenticate);

        let send = Frame::send_message("bob", "hi", None);
        assert_eq!(send.kind(), FrameKind::SendMessage);
    }

    #[test]
    fn test_event_names_on_wire() {
        // The `type` tag must match the documented case-sensitive event names.
        let cases = [
            (Frame::authenticate("t"), "authenticate"),
            (Frame::auth_error("bad"), "auth_error"),
            (Frame::get_online_status(vec![]), "get_online_status"),
            (
                Frame::UserOnline {
                    user_id: "alice".into(),
                },
                "user_online",
            ),
            (Frame::send_message("bob", "hi", None), "send_message"),
            (Frame::MessageDelivered { message_id: 7 }, "message_delivered"),
            (Frame::typing_start_to("bob"), "typing_start"),
        ];

        for (frame, expected) in cases {
            let value = serde_json::to_value(&frame).unwrap();
            assert_eq!(value["type"], expected);
        }
    }

    #[test]
    fn test_payload_keys_are_camel_case() {
        let frame = Frame::authenticated("alice", "sess-1");
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["userId"], "alice");
        assert_eq!(value["sessionId"], "sess-1");

        let frame = Frame::ReceiveMessage {
            from: "alice".into(),
            content: "hi".into(),
            timestamp: 42,
            message_id: 7,
            metadata: None,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["messageId"], 7);
        // Absent metadata is skipped, not serialized as null.
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn test_typing_frame_directions() {
        let outbound = Frame::typing_start_to("bob");
        let value = serde_json::to_value(&outbound).unwrap();
        assert_eq!(value["to"], "bob");
        assert!(value.get("from").is_none());

        let relayed = Frame::TypingStart {
            to: None,
            from: Some("alice".into()),
        };
        let value = serde_json::to_value(&relayed).unwrap();
        assert_eq!(value["from"], "alice");
        assert!(value.get("to").is_none());
    }
}
