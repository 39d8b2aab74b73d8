//! End-to-end relay tests: real clients against a real server over the
//! in-process memory transport.

use courier_client::{ClientConfig, ClientEvent, ClientEventKind, ConnectionState, CourierClient};
use courier_server::{CourierServer, ServerConfig, StaticTokenValidator};
use courier_transport::{memory_transport, MemoryConnector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn tokens() -> HashMap<String, String> {
    let mut tokens = HashMap::new();
    tokens.insert("t1".to_string(), "alice".to_string());
    tokens.insert("t2".to_string(), "bob".to_string());
    tokens
}

fn start_server() -> (MemoryConnector, Arc<CourierServer>) {
    let (listener, connector) = memory_transport();

    let mut config = ServerConfig::default();
    config.metrics.enabled = false;

    let server = Arc::new(CourierServer::new(
        config,
        Arc::new(StaticTokenValidator::new(tokens())),
    ));
    tokio::spawn(Arc::clone(&server).run(Arc::new(listener)));

    (connector, server)
}

fn client(connector: &MemoryConnector) -> CourierClient {
    let config = ClientConfig::new("memory://relay")
        .manual_connect()
        .without_reconnection();
    CourierClient::new(Arc::new(connector.clone()), config)
}

fn watch(client: &CourierClient, kind: ClientEventKind) -> mpsc::UnboundedReceiver<ClientEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on(kind, move |event| {
        let _ = tx.send(event.clone());
        Ok(())
    });
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn connect_and_auth(client: &CourierClient, token: &str) {
    let mut authed = watch(client, ClientEventKind::Authenticated);
    client.connect().await.expect("connect failed");
    client.authenticate(token).expect("authenticate failed");
    next(&mut authed).await;
}

#[tokio::test]
async fn handshake_binds_identity() {
    let (connector, server) = start_server();
    let alice = client(&connector);

    let mut authed = watch(&alice, ClientEventKind::Authenticated);
    alice.connect().await.unwrap();
    assert!(alice.is_connected());
    assert!(!alice.is_authenticated());

    alice.authenticate("t1").unwrap();
    match next(&mut authed).await {
        ClientEvent::Authenticated {
            user_id,
            session_id,
        } => {
            assert_eq!(user_id, "alice");
            assert!(!session_id.is_empty());
        }
        other => panic!("Expected Authenticated, got {:?}", other),
    }

    assert!(alice.is_authenticated());
    assert_eq!(alice.user_id().as_deref(), Some("alice"));
    assert!(server.registry().is_online("alice"));
}

#[tokio::test]
async fn invalid_token_is_rejected_and_disconnected() {
    let (connector, server) = start_server();
    let anon = client(&connector);

    let mut errors = watch(&anon, ClientEventKind::AuthError);
    let mut drops = watch(&anon, ClientEventKind::Disconnect);

    anon.connect().await.unwrap();
    anon.authenticate("wrong").unwrap();

    match next(&mut errors).await {
        ClientEvent::AuthError { message } => assert_eq!(message, "Invalid token"),
        other => panic!("Expected AuthError, got {:?}", other),
    }
    // The server forces the session closed; no retry.
    assert!(matches!(
        next(&mut drops).await,
        ClientEvent::Disconnect { .. }
    ));
    assert!(!anon.is_authenticated());

    // Give the server driver a beat to finish its teardown.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.registry().count(), 0);
}

#[tokio::test]
async fn message_to_offline_recipient_errors_without_delivery() {
    let (connector, _server) = start_server();

    let alice = client(&connector);
    connect_and_auth(&alice, "t1").await;

    // A bystander who must observe nothing.
    let bob_watcher = client(&connector);
    connect_and_auth(&bob_watcher, "t2").await;
    let mut bystander_inbox = watch(&bob_watcher, ClientEventKind::MessageReceived);

    let mut errors = watch(&alice, ClientEventKind::MessageError);
    alice.send_message("carol", "hi", None).unwrap();

    match next(&mut errors).await {
        ClientEvent::MessageError { message_id, error } => {
            assert!(message_id.is_some());
            assert_eq!(error, "Recipient is offline");
        }
        other => panic!("Expected MessageError, got {:?}", other),
    }

    // No receive_message was delivered anywhere.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bystander_inbox.try_recv().is_err());
}

#[tokio::test]
async fn point_to_point_delivery_confirms_with_matching_id() {
    let (connector, _server) = start_server();

    let alice = client(&connector);
    let bob = client(&connector);
    connect_and_auth(&alice, "t1").await;
    connect_and_auth(&bob, "t2").await;

    let mut inbox = watch(&bob, ClientEventKind::MessageReceived);
    let mut confirmations = watch(&alice, ClientEventKind::MessageDelivered);

    alice
        .send_message("bob", "hi", Some(serde_json::json!({"thread": 7})))
        .unwrap();

    let received_id = match next(&mut inbox).await {
        ClientEvent::MessageReceived {
            from,
            content,
            message_id,
            metadata,
            ..
        } => {
            assert_eq!(from, "alice");
            assert_eq!(content, "hi");
            assert_eq!(metadata, Some(serde_json::json!({"thread": 7})));
            message_id
        }
        other => panic!("Expected MessageReceived, got {:?}", other),
    };

    match next(&mut confirmations).await {
        ClientEvent::MessageDelivered { message_id } => assert_eq!(message_id, received_id),
        other => panic!("Expected MessageDelivered, got {:?}", other),
    }
}

#[tokio::test]
async fn unauthenticated_typing_is_silent_everywhere() {
    let (connector, _server) = start_server();

    let anon = client(&connector);
    anon.connect().await.unwrap();

    let bob = client(&connector);
    connect_and_auth(&bob, "t2").await;
    let mut bob_typing = watch(&bob, ClientEventKind::TypingStarted);
    let mut anon_errors = watch(&anon, ClientEventKind::MessageError);

    anon.start_typing("bob");

    // Verifiable by absence: no typing event, no error, to anyone.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bob_typing.try_recv().is_err());
    assert!(anon_errors.try_recv().is_err());
}

#[tokio::test]
async fn typing_indicators_relay_sender_identity() {
    let (connector, _server) = start_server();

    let alice = client(&connector);
    let bob = client(&connector);
    connect_and_auth(&alice, "t1").await;
    connect_and_auth(&bob, "t2").await;

    let mut started = watch(&bob, ClientEventKind::TypingStarted);
    let mut stopped = watch(&bob, ClientEventKind::TypingStopped);

    alice.start_typing("bob");
    match next(&mut started).await {
        ClientEvent::TypingStarted { from } => assert_eq!(from, "alice"),
        other => panic!("Expected TypingStarted, got {:?}", other),
    }

    alice.stop_typing("bob");
    match next(&mut stopped).await {
        ClientEvent::TypingStopped { from } => assert_eq!(from, "alice"),
        other => panic!("Expected TypingStopped, got {:?}", other),
    }
}

#[tokio::test]
async fn presence_broadcasts_reach_every_connected_session() {
    let (connector, _server) = start_server();

    // An unauthenticated observer still receives presence broadcasts.
    let observer = client(&connector);
    observer.connect().await.unwrap();
    let mut online = watch(&observer, ClientEventKind::UserOnline);
    let mut offline = watch(&observer, ClientEventKind::UserOffline);

    let bob = client(&connector);
    connect_and_auth(&bob, "t2").await;

    match next(&mut online).await {
        ClientEvent::UserOnline { user_id } => assert_eq!(user_id, "bob"),
        other => panic!("Expected UserOnline, got {:?}", other),
    }

    bob.disconnect();
    match next(&mut offline).await {
        ClientEvent::UserOffline { user_id } => assert_eq!(user_id, "bob"),
        other => panic!("Expected UserOffline, got {:?}", other),
    }
}

#[tokio::test]
async fn online_status_query_needs_connection_not_auth() {
    let (connector, _server) = start_server();

    let alice = client(&connector);
    connect_and_auth(&alice, "t1").await;

    let anon = client(&connector);
    anon.connect().await.unwrap();
    let mut statuses = watch(&anon, ClientEventKind::OnlineStatus);

    anon.get_online_status(vec!["alice".to_string(), "ghost".to_string()])
        .unwrap();

    match next(&mut statuses).await {
        ClientEvent::OnlineStatus { statuses } => {
            assert_eq!(statuses.get("alice"), Some(&true));
            assert_eq!(statuses.get("ghost"), Some(&false));
        }
        other => panic!("Expected OnlineStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn last_authentication_wins_for_delivery() {
    let (connector, _server) = start_server();

    // Two sessions authenticate as the same user; the second displaces the
    // first silently.
    let first = client(&connector);
    let second = client(&connector);
    connect_and_auth(&first, "t1").await;
    connect_and_auth(&second, "t1").await;

    let mut first_inbox = watch(&first, ClientEventKind::MessageReceived);
    let mut second_inbox = watch(&second, ClientEventKind::MessageReceived);

    let bob = client(&connector);
    connect_and_auth(&bob, "t2").await;
    bob.send_message("alice", "which session?", None).unwrap();

    match next(&mut second_inbox).await {
        ClientEvent::MessageReceived { from, content, .. } => {
            assert_eq!(from, "bob");
            assert_eq!(content, "which session?");
        }
        other => panic!("Expected MessageReceived, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(first_inbox.try_recv().is_err());
}

#[tokio::test]
async fn client_reconnects_after_server_side_close() {
    let (connector, _server) = start_server();

    let config = ClientConfig::new("memory://relay")
        .manual_connect()
        .with_reconnection_attempts(3)
        .with_reconnection_delay(Duration::from_millis(50));
    let client = CourierClient::new(Arc::new(connector.clone()), config);

    let mut connects = watch(&client, ClientEventKind::Connect);
    let mut drops = watch(&client, ClientEventKind::Disconnect);

    client.connect().await.unwrap();
    next(&mut connects).await;

    // A bad token makes the server force the connection closed, which is
    // not client-initiated, so the reconnection loop kicks in.
    client.authenticate("wrong").unwrap();
    next(&mut drops).await;

    next(&mut connects).await;
    assert_eq!(client.state(), ConnectionState::Connected);
}
