//! User API Tests

use axum::http::StatusCode;
use serde_json::json;

use crate::common::{assert_status, body_json, token_for, TestApp};

#[tokio::test]
async fn test_relation_lists_friends_and_rooms() {
    let app = TestApp::new().await;
    let (alice, bob) = app.seed_friends("alice", "bob");
    let room = app.seed_room("general", &alice, &[bob.id]);

    let response = app
        .get_auth("/api/v1/users/@me/relation", &token_for(alice.id))
        .await;
    assert_status(&response, StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["user"]["name"], "alice");
    assert_eq!(json["friends"][0]["id"], bob.id);
    assert_eq!(json["rooms"][0]["id"], room.id);
}

#[tokio::test]
async fn test_relation_for_unknown_user() {
    let app = TestApp::new().await;

    let response = app
        .get_auth("/api/v1/users/@me/relation", &token_for(77))
        .await;

    assert_status(&response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_friend_is_mutual() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let bob = app.seed_user("bob");
    let body = json!({ "user_id": bob.id }).to_string();

    let response = app
        .post_json_auth("/api/v1/users/@me/friends", &body, &token_for(alice.id))
        .await;
    assert_status(&response, StatusCode::CREATED);
    assert_eq!(body_json(response).await["id"], bob.id);

    let response = app
        .get_auth("/api/v1/users/@me/relation", &token_for(bob.id))
        .await;
    assert_eq!(body_json(response).await["friends"][0]["id"], alice.id);

    // A second request for the same pair is rejected.
    let response = app
        .post_json_auth("/api/v1/users/@me/friends", &body, &token_for(alice.id))
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cannot_befriend_self() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");

    let response = app
        .post_json_auth(
            "/api/v1/users/@me/friends",
            &json!({ "user_id": alice.id }).to_string(),
            &token_for(alice.id),
        )
        .await;

    assert_status(&response, StatusCode::BAD_REQUEST);
}
