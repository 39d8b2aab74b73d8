//! Presence handler.

use crate::handlers::ProtocolHandler;
use async_trait::async_trait;
use courier_core::{Registry, Session};
use courier_protocol::{Frame, FrameKind};
use std::sync::Arc;
use tracing::debug;

/// Handler for presence queries and broadcasts.
///
/// Queries are answered per connection. The broadcast operations are owned
/// here but invoked by the server orchestrator when a session
/// authenticates or disconnects; the handler never triggers them itself.
pub struct PresenceHandler {
    registry: Arc<Registry>,
}

impl PresenceHandler {
    /// Create the handler over a registry.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Tell every connected session that a user came online.
    pub fn broadcast_online(&self, user_id: &str) {
        debug!(user = %user_id, "Broadcasting user online");
        for session in self.registry.sessions() {
            session.emit(Frame::UserOnline {
                user_id: user_id.to_string(),
            });
        }
    }

    /// Tell every connected session that a user went offline.
    pub fn broadcast_offline(&self, user_id: &str) {
        debug!(user = %user_id, "Broadcasting user offline");
        for session in self.registry.sessions() {
            session.emit(Frame::UserOffline {
                user_id: user_id.to_string(),
            });
        }
    }
}

#[async_trait]
impl ProtocolHandler for PresenceHandler {
    fn name(&self) -> &'static str {
        "presence"
    }

    fn handle_connection(&self, session: &Arc<Session>) {
        let registry = Arc::clone(&self.registry);

        session.on(
            FrameKind::GetOnlineStatus,
            Arc::new(move |session, frame| {
                let registry = Arc::clone(&registry);
                Box::pin(async move {
                    let Frame::GetOnlineStatus { user_ids } = frame else {
                        return Ok(());
                    };
                    // Any connected session may query, authenticated or not.
                    let statuses = registry.batch_status(&user_ids);
                    session.emit(Frame::OnlineStatus { statuses });
                    Ok(())
                })
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{SessionCommand, User};

    #[tokio::test]
    async fn test_query_answers_with_batch_status() {
        let registry = Arc::new(Registry::new());
        let handler = PresenceHandler::new(Arc::clone(&registry));

        let (alice, _alice_rx) = Session::new("s1");
        registry.add(Arc::clone(&alice));
        registry.authenticate("s1", User::new("alice")).unwrap();

        // The querying session never authenticated; the query still works.
        let (anon, mut anon_rx) = Session::new("s2");
        registry.add(Arc::clone(&anon));
        handler.handle_connection(&anon);

        anon.dispatch(Frame::get_online_status(vec![
            "alice".to_string(),
            "bob".to_string(),
        ]))
        .await;

        match anon_rx.recv().await.unwrap() {
            SessionCommand::Send(Frame::OnlineStatus { statuses }) => {
                assert_eq!(statuses.get("alice"), Some(&true));
                assert_eq!(statuses.get("bob"), Some(&false));
            }
            other => panic!("Expected OnlineStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let registry = Arc::new(Registry::new());
        let handler = PresenceHandler::new(Arc::clone(&registry));

        let (s1, mut rx1) = Session::new("s1");
        let (s2, mut rx2) = Session::new("s2");
        registry.add(Arc::clone(&s1));
        registry.add(Arc::clone(&s2));

        handler.broadcast_online("alice");

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                SessionCommand::Send(Frame::UserOnline { user_id }) => {
                    assert_eq!(user_id, "alice");
                }
                other => panic!("Expected UserOnline, got {:?}", other),
            }
        }

        handler.broadcast_offline("alice");
        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                SessionCommand::Send(Frame::UserOffline { user_id }) => {
                    assert_eq!(user_id, "alice");
                }
                other => panic!("Expected UserOffline, got {:?}", other),
            }
        }
    }
}
