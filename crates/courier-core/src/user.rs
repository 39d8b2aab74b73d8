//! Authenticated user identity.

use serde::{Deserialize, Serialize};

/// Server-side identity bound to exactly one live session at a time.
///
/// Produced by the authentication validator; the auth handler stamps
/// `session_id` and `connected_at` before the user enters the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Application-level user id.
    pub id: String,
    /// Transport session this user is currently bound to.
    #[serde(default)]
    pub session_id: String,
    /// Milliseconds since the Unix epoch at which the binding was made.
    #[serde(default)]
    pub connected_at: u64,
    /// Opaque application metadata.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<serde_json::Value>,
}

impl User {
    /// Create a user with the given id and no metadata.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_id: String::new(),
            connected_at: 0,
            metadata: None,
        }
    }

    /// Attach application metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
