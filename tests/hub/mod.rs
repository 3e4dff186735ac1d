//! Hub scenario tests
//!
//! Connections are plain [`ChannelConn`]s registered through the public
//! [`HubHandle`]; frames are read from their outbound queues.

use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use chat_hub::application::dto::actions::{
    ActionMessage, AddRoomMember, ChatMessage, DeleteRoom, ReadMessage, RemoveRoomMember,
};
use chat_hub::domain::Store;
use chat_hub::presentation::websocket::{Conn, HubError, MAX_CONNS};

use crate::common::{
    assert_silent, conn, eventually, next_event, next_frame, token_for, TestApp,
};

// ============================================================================
// Presence
// ============================================================================

#[tokio::test]
async fn test_friend_receives_presence() {
    let app = TestApp::new().await;
    let (alice, bob) = app.seed_friends("alice", "bob");

    let (alice_conn, mut alice_rx) = conn(alice.id);
    let (bob_conn, mut bob_rx) = conn(bob.id);
    app.state.hub.connect(alice_conn.clone()).await.unwrap();
    app.state.hub.connect(bob_conn.clone()).await.unwrap();

    let frame = next_frame(&mut alice_rx).await;
    assert_eq!(frame["event"], "user_connected");
    assert_eq!(frame["data"]["user_id"], bob.id);
    assert_eq!(frame["data"]["user_name"], "bob");
    assert!(frame["data"]["occurs_at"].is_string());
    assert_silent(&mut bob_rx).await;
}

#[tokio::test]
async fn test_second_connection_does_not_reannounce() {
    let app = TestApp::new().await;
    let (alice, bob) = app.seed_friends("alice", "bob");

    let (alice_conn, mut alice_rx) = conn(alice.id);
    app.state.hub.connect(alice_conn).await.unwrap();

    let (bob_first, _r1) = conn(bob.id);
    let (bob_second, _r2) = conn(bob.id);
    app.state.hub.connect(bob_first.clone()).await.unwrap();
    app.state.hub.connect(bob_second.clone()).await.unwrap();
    assert_eq!(next_frame(&mut alice_rx).await["event"], "user_connected");
    assert_silent(&mut alice_rx).await;

    app.state.hub.disconnect(bob_first).await;
    assert_silent(&mut alice_rx).await;

    app.state.hub.disconnect(bob_second).await;
    assert_eq!(next_frame(&mut alice_rx).await["event"], "user_disconnected");
}

#[tokio::test]
async fn test_seventeenth_connection_is_refused() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");

    let mut open = Vec::new();
    for _ in 0..MAX_CONNS {
        let (c, rx) = conn(alice.id);
        app.state.hub.connect(c.clone()).await.unwrap();
        open.push((c, rx));
    }

    let (extra, _rx) = conn(alice.id);
    let err = app.state.hub.connect(extra.clone()).await.unwrap_err();
    assert!(matches!(err, HubError::ExceedsConnLimit { max: 16, .. }));
    assert!(open.iter().all(|(c, _)| !c.is_closed()));
}

// ============================================================================
// Room events
// ============================================================================

#[tokio::test]
async fn test_chat_message_reaches_both_members() {
    let app = TestApp::new().await;
    let (alice, bob) = app.seed_friends("alice", "bob");
    let room = app.seed_room("general", &alice, &[bob.id]);

    let (alice_conn, mut alice_rx) = conn(alice.id);
    let (bob_conn, mut bob_rx) = conn(bob.id);
    app.state.hub.connect(alice_conn.clone()).await.unwrap();
    app.state.hub.connect(bob_conn).await.unwrap();

    app.state
        .hub
        .send(
            alice_conn,
            ActionMessage::ChatMessage(ChatMessage {
                room_id: room.id,
                content: "hi".into(),
            }),
        )
        .await
        .unwrap();

    let to_alice = next_event(&mut alice_rx, "message_created").await;
    let to_bob = next_event(&mut bob_rx, "message_created").await;
    for frame in [&to_alice, &to_bob] {
        assert_eq!(frame["data"]["room_id"], room.id);
        assert_eq!(frame["data"]["content"], "hi");
        assert!(frame["data"]["message_id"].as_u64().unwrap() > 0);
    }
    assert_eq!(to_alice["data"]["message_id"], to_bob["data"]["message_id"]);
}

#[tokio::test]
async fn test_read_without_timestamp_uses_now() {
    let app = TestApp::new().await;
    let (alice, bob) = app.seed_friends("alice", "bob");
    let room = app.seed_room("general", &alice, &[bob.id]);

    let (alice_conn, mut alice_rx) = conn(alice.id);
    app.state.hub.connect(alice_conn.clone()).await.unwrap();

    let before = Utc::now();
    app.state
        .hub
        .send(
            alice_conn,
            ActionMessage::ReadMessage(ReadMessage {
                room_id: room.id,
                read_at: None,
            }),
        )
        .await
        .unwrap();

    let frame = next_event(&mut alice_rx, "room_messages_read").await;
    let read_at: DateTime<Utc> = frame["data"]["read_at"].as_str().unwrap().parse().unwrap();
    let after = Utc::now();
    assert!(read_at >= before && read_at <= after);
    assert_eq!(frame["data"]["user_id"], alice.id);
}

#[tokio::test]
async fn test_rest_message_reaches_gateway_clients() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let bob = app.seed_user("bob");
    let room = app.seed_room("general", &alice, &[bob.id]);

    let (alice_conn, mut alice_rx) = conn(alice.id);
    app.state.hub.connect(alice_conn).await.unwrap();

    app.post_json_auth(
        &format!("/api/v1/rooms/{}/messages", room.id),
        &json!({ "content": "from rest" }).to_string(),
        &token_for(bob.id),
    )
    .await;

    let frame = next_event(&mut alice_rx, "message_created").await;
    assert_eq!(frame["data"]["content"], "from rest");
    assert_eq!(frame["data"]["user_id"], bob.id);
}

#[tokio::test]
async fn test_added_member_joins_live_room() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let carol = app.seed_user("carol");
    let room = app.seed_room("general", &alice, &[]);

    let (alice_conn, mut alice_rx) = conn(alice.id);
    let (carol_conn, mut carol_rx) = conn(carol.id);
    app.state.hub.connect(alice_conn.clone()).await.unwrap();
    app.state.hub.connect(carol_conn.clone()).await.unwrap();

    app.state
        .hub
        .send(
            alice_conn.clone(),
            ActionMessage::AddRoomMember(AddRoomMember {
                room_id: room.id,
                user_id: carol.id,
            }),
        )
        .await
        .unwrap();

    let frame = next_event(&mut carol_rx, "room_added_member").await;
    assert_eq!(frame["data"]["user_id"], carol.id);
    next_event(&mut alice_rx, "room_added_member").await;

    // Carol can now post in the room.
    app.state
        .hub
        .send(
            carol_conn,
            ActionMessage::ChatMessage(ChatMessage {
                room_id: room.id,
                content: "thanks".into(),
            }),
        )
        .await
        .unwrap();
    let frame = next_event(&mut alice_rx, "message_created").await;
    assert_eq!(frame["data"]["user_id"], carol.id);
}

#[tokio::test]
async fn test_removed_member_is_notified_then_excluded() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let bob = app.seed_user("bob");
    let room = app.seed_room("general", &alice, &[bob.id]);

    let (alice_conn, mut alice_rx) = conn(alice.id);
    let (bob_conn, mut bob_rx) = conn(bob.id);
    app.state.hub.connect(alice_conn.clone()).await.unwrap();
    app.state.hub.connect(bob_conn.clone()).await.unwrap();

    app.state
        .hub
        .send(
            alice_conn.clone(),
            ActionMessage::RemoveRoomMember(RemoveRoomMember {
                room_id: room.id,
                user_id: bob.id,
            }),
        )
        .await
        .unwrap();

    next_event(&mut alice_rx, "room_removed_member").await;
    let frame = next_event(&mut bob_rx, "room_removed_member").await;
    assert_eq!(frame["data"]["removed_by"], alice.id);

    // Bob's gateway session no longer holds the room.
    app.state
        .hub
        .send(
            bob_conn,
            ActionMessage::ChatMessage(ChatMessage {
                room_id: room.id,
                content: "still here?".into(),
            }),
        )
        .await
        .unwrap();
    let frame = next_event(&mut bob_rx, "error").await;
    assert!(frame["data"]["error"].is_string());
    assert_eq!(frame["data"]["cause"]["action"], "chat_message");
    assert_silent(&mut alice_rx).await;
}

#[tokio::test]
async fn test_delete_room_notifies_and_cleans_messages() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let bob = app.seed_user("bob");
    let room = app.seed_room("doomed", &alice, &[bob.id]);

    let (alice_conn, mut alice_rx) = conn(alice.id);
    let (bob_conn, mut bob_rx) = conn(bob.id);
    app.state.hub.connect(alice_conn.clone()).await.unwrap();
    app.state.hub.connect(bob_conn).await.unwrap();

    for content in ["a", "b"] {
        app.state
            .hub
            .send(
                alice_conn.clone(),
                ActionMessage::ChatMessage(ChatMessage {
                    room_id: room.id,
                    content: content.into(),
                }),
            )
            .await
            .unwrap();
        next_event(&mut alice_rx, "message_created").await;
    }

    app.state
        .hub
        .send(
            alice_conn,
            ActionMessage::DeleteRoom(DeleteRoom { room_id: room.id }),
        )
        .await
        .unwrap();

    let frame = next_event(&mut bob_rx, "room_deleted").await;
    assert_eq!(frame["data"]["room_id"], room.id);
    next_event(&mut alice_rx, "room_deleted").await;

    let store = app.store.clone();
    let room_id = room.id;
    let cleaned = eventually(|| {
        let store = store.clone();
        async move {
            store
                .find_room_messages(room_id, None, 100)
                .await
                .map(|messages| messages.is_empty())
                .unwrap_or(false)
        }
    })
    .await;
    assert!(cleaned);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_unknown_action_reported_to_sender_only() {
    let app = TestApp::new().await;
    let (alice, bob) = app.seed_friends("alice", "bob");

    let (alice_conn, mut alice_rx) = conn(alice.id);
    let (bob_conn, mut bob_rx) = conn(bob.id);
    app.state.hub.connect(bob_conn).await.unwrap();
    app.state.hub.connect(alice_conn.clone()).await.unwrap();
    next_event(&mut bob_rx, "user_connected").await;

    let error = ActionMessage::parse(r#"{"action":"teleport","data":{}}"#).unwrap_err();
    app.state
        .hub
        .report_error(alice_conn, error)
        .await
        .unwrap();

    let frame = next_frame(&mut alice_rx).await;
    assert_eq!(frame["event"], "error");
    assert!(frame["data"]["error"].is_string());
    assert_eq!(frame["data"]["cause"]["action"], "teleport");
    assert_silent(&mut bob_rx).await;
}

#[tokio::test]
async fn test_failed_command_publishes_nothing() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let bob = app.seed_user("bob");
    let room = app.seed_room("general", &alice, &[bob.id]);
    let events_before = app.store.events().len();

    let (bob_conn, mut bob_rx) = conn(bob.id);
    let (alice_conn, mut alice_rx) = conn(alice.id);
    app.state.hub.connect(bob_conn.clone()).await.unwrap();
    app.state.hub.connect(alice_conn).await.unwrap();

    // Only the owner may delete.
    app.state
        .hub
        .send(
            bob_conn,
            ActionMessage::DeleteRoom(DeleteRoom { room_id: room.id }),
        )
        .await
        .unwrap();

    assert_eq!(next_frame(&mut bob_rx).await["event"], "error");
    assert_silent(&mut alice_rx).await;
    assert_eq!(app.store.events().len(), events_before);
    assert!(app.store.find_room(room.id).await.unwrap().is_some());
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_releases_bus_and_closes_connections() {
    let mut app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let (alice_conn, _rx) = conn(alice.id);
    app.state.hub.connect(alice_conn.clone()).await.unwrap();

    // Hub and message cleaner.
    assert_eq!(app.bus.subscriber_count(), 2);

    app.state.hub.shutdown();
    let bus = app.bus.clone();
    assert!(eventually(|| {
        let bus = bus.clone();
        async move { bus.subscriber_count() == 1 }
    })
    .await);

    app.shutdown().await;
    assert_eq!(app.bus.subscriber_count(), 0);

    assert!(alice_conn.is_closed());
    let (late, _late_rx) = conn(alice.id);
    assert!(matches!(
        app.state.hub.connect(late).await,
        Err(HubError::Closed)
    ));
}
