//! Authentication handshake handler.

use crate::handlers::ProtocolHandler;
use crate::metrics;
use async_trait::async_trait;
use courier_core::{Registry, Session, User};
use courier_protocol::{Frame, FrameKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error raised by a token validator.
pub type ValidatorError = Box<dyn std::error::Error + Send + Sync>;

/// Externally supplied token validator.
///
/// The relay never interprets tokens itself; the embedding application
/// injects the validator at construction time.
#[async_trait]
pub trait AuthValidator: Send + Sync {
    /// Resolve a token to a user, or `None` when the token is invalid.
    async fn validate(&self, token: &str) -> Result<Option<User>, ValidatorError>;
}

/// Validator backed by a static token table.
///
/// Suitable for fixed deployments and tests; production embeddings usually
/// inject their own validator against a real identity service.
pub struct StaticTokenValidator {
    tokens: HashMap<String, String>,
}

impl StaticTokenValidator {
    /// Create a validator from a token to user-id table.
    #[must_use]
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl AuthValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<Option<User>, ValidatorError> {
        Ok(self.tokens.get(token).map(User::new))
    }
}

/// Handler for the `authenticate` request.
///
/// A failed validation is answered with `auth_error` and a forced
/// disconnect; there is no retry. This is the one listener that suspends
/// (awaiting the validator), so it mutates the registry only after the
/// await completes.
pub struct AuthHandler {
    registry: Arc<Registry>,
    validator: Arc<dyn AuthValidator>,
}

impl AuthHandler {
    /// Create the handler over a registry and an injected validator.
    #[must_use]
    pub fn new(registry: Arc<Registry>, validator: Arc<dyn AuthValidator>) -> Self {
        Self {
            registry,
            validator,
        }
    }
}

#[async_trait]
impl ProtocolHandler for AuthHandler {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn handle_connection(&self, session: &Arc<Session>) {
        let registry = Arc::clone(&self.registry);
        let validator = Arc::clone(&self.validator);

        session.on(
            FrameKind::Authenticate,
            Arc::new(move |session, frame| {
                let registry = Arc::clone(&registry);
                let validator = Arc::clone(&validator);
                Box::pin(async move {
                    let Frame::Authenticate { token } = frame else {
                        return Ok(());
                    };

                    match validator.validate(&token).await {
                        Ok(Some(user)) => {
                            let user_id = user.id.clone();
                            match registry.authenticate(session.id(), user) {
                                Ok(_) => {
                                    info!(session = %session.id(), user = %user_id, "Authenticated");
                                    session.emit(Frame::authenticated(user_id.as_str(), session.id()));
                                    session.notify_authenticated(user_id);
                                }
                                Err(e) => {
                                    // The session disconnected while the
                                    // validator was running.
                                    debug!(session = %session.id(), error = %e, "Authentication resolved for a dead session");
                                }
                            }
                        }
                        Ok(None) => {
                            warn!(session = %session.id(), "Invalid token");
                            metrics::record_auth_failure();
                            session.emit(Frame::auth_error("Invalid token"));
                            session.close();
                        }
                        Err(e) => {
                            warn!(session = %session.id(), error = %e, "Token validator failed");
                            metrics::record_auth_failure();
                            session.emit(Frame::auth_error("Authentication failed"));
                            session.close();
                        }
                    }
                    Ok(())
                })
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::SessionCommand;

    struct FailingValidator;

    #[async_trait]
    impl AuthValidator for FailingValidator {
        async fn validate(&self, _token: &str) -> Result<Option<User>, ValidatorError> {
            Err("identity service unreachable".into())
        }
    }

    fn table() -> Arc<StaticTokenValidator> {
        let mut tokens = HashMap::new();
        tokens.insert("t1".to_string(), "alice".to_string());
        Arc::new(StaticTokenValidator::new(tokens))
    }

    #[tokio::test]
    async fn test_valid_token_authenticates_and_notifies() {
        let registry = Arc::new(Registry::new());
        let handler = AuthHandler::new(Arc::clone(&registry), table());

        let (session, mut rx) = Session::new("s1");
        registry.add(Arc::clone(&session));
        handler.handle_connection(&session);

        session.dispatch(Frame::authenticate("t1")).await;

        assert!(session.is_authenticated());
        assert!(registry.is_online("alice"));

        match rx.recv().await.unwrap() {
            SessionCommand::Send(Frame::Authenticated { user_id, session_id }) => {
                assert_eq!(user_id, "alice");
                assert_eq!(session_id, "s1");
            }
            other => panic!("Expected Authenticated, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            SessionCommand::Authenticated { user_id } => assert_eq!(user_id, "alice"),
            other => panic!("Expected Authenticated notice, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_token_rejects_and_closes() {
        let registry = Arc::new(Registry::new());
        let handler = AuthHandler::new(Arc::clone(&registry), table());

        let (session, mut rx) = Session::new("s1");
        registry.add(Arc::clone(&session));
        handler.handle_connection(&session);

        session.dispatch(Frame::authenticate("wrong")).await;

        assert!(!session.is_authenticated());
        assert!(!registry.is_online("alice"));

        match rx.recv().await.unwrap() {
            SessionCommand::Send(Frame::AuthError { message }) => {
                assert_eq!(message, "Invalid token");
            }
            other => panic!("Expected AuthError, got {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), SessionCommand::Close));
    }

    #[tokio::test]
    async fn test_validator_error_rejects_generically() {
        let registry = Arc::new(Registry::new());
        let handler = AuthHandler::new(Arc::clone(&registry), Arc::new(FailingValidator));

        let (session, mut rx) = Session::new("s1");
        registry.add(Arc::clone(&session));
        handler.handle_connection(&session);

        session.dispatch(Frame::authenticate("t1")).await;

        match rx.recv().await.unwrap() {
            SessionCommand::Send(Frame::AuthError { message }) => {
                assert_eq!(message, "Authentication failed");
            }
            other => panic!("Expected AuthError, got {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), SessionCommand::Close));
    }
}
