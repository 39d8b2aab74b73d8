//! Dual-indexed registry of live server sessions.
//!
//! Sessions are addressable both by transport session id and by
//! authenticated user id. The two maps are kept mutually consistent:
//! a user entry always points at a live session bound to that user, and
//! removing a session clears any user entry pointing at it. Authenticating
//! the same user id on a second session overwrites the first mapping
//! (last authentication wins) while leaving the displaced session itself
//! in place.

use crate::message::now_millis;
use crate::session::{Session, SessionId};
use crate::user::User;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No session with the given id.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
}

/// Process-wide store of active sessions.
///
/// The registry is owned by the server orchestrator and handed to each
/// protocol handler by `Arc` at construction time; all mutation goes
/// through these operations.
pub struct Registry {
    /// Sessions indexed by transport session id.
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Session ids indexed by authenticated user id.
    users: DashMap<String, SessionId>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Register a new session.
    pub fn add(&self, session: Arc<Session>) {
        debug!(session = %session.id(), "Session registered");
        self.sessions.insert(session.id().to_string(), session);
    }

    /// Remove a session by id, returning it when present.
    ///
    /// Any user entry pointing at this session is removed with it. A user
    /// entry already overwritten by a later authentication is left alone.
    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(session_id)?;
        if let Some(user_id) = session.user_id() {
            self.users
                .remove_if(&user_id, |_, sid| sid.as_str() == session_id);
        }
        debug!(session = %session_id, "Session removed");
        Some(session)
    }

    /// Look up a session by transport session id.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    /// Look up the session currently bound to a user id.
    #[must_use]
    pub fn get_by_user_id(&self, user_id: &str) -> Option<Arc<Session>> {
        let session_id = self.users.get(user_id).map(|sid| sid.value().clone())?;
        self.get(&session_id)
    }

    /// Bind an authenticated user to a session.
    ///
    /// Stamps `session_id` and `connected_at` onto the user, marks the
    /// session authenticated, and installs the user index entry. A prior
    /// binding for the same user id is overwritten: the previous session
    /// stays registered but is no longer addressable by user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the session id is unknown.
    pub fn authenticate(&self, session_id: &str, mut user: User) -> Result<Arc<Session>, RegistryError> {
        let session = self
            .get(session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;

        user.session_id = session_id.to_string();
        user.connected_at = now_millis();
        let user_id = user.id.clone();

        session.set_authenticated_user(user);
        if let Some(previous) = self.users.insert(user_id.clone(), session_id.to_string()) {
            if previous != session_id {
                warn!(user = %user_id, displaced = %previous, "User re-authenticated on a new session");
            }
        }

        debug!(session = %session_id, user = %user_id, "Session authenticated");
        Ok(session)
    }

    /// Whether a user currently has a live authenticated session.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Ids of all users with a live authenticated session.
    #[must_use]
    pub fn online_user_ids(&self) -> Vec<String> {
        self.users.iter().map(|e| e.key().clone()).collect()
    }

    /// Online flag for every requested user id.
    ///
    /// Every requested id is present in the result, defaulting to `false`
    /// for unknown users.
    #[must_use]
    pub fn batch_status(&self, user_ids: &[String]) -> HashMap<String, bool> {
        user_ids
            .iter()
            .map(|id| (id.clone(), self.is_online(id)))
            .collect()
    }

    /// Number of registered sessions (authenticated or not).
    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of every registered session, for broadcasts.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
