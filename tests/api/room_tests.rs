//! Room API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;

use chat_hub::domain::Store;

use crate::common::{assert_status, body_json, eventually, token_for, TestApp};

// ============================================================================
// Create / get / delete
// ============================================================================

#[tokio::test]
async fn test_create_and_get_room() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let bob = app.seed_user("bob");
    let token = token_for(alice.id);

    let response = app
        .post_json_auth(
            "/api/v1/rooms",
            &json!({ "name": "general", "member_ids": [bob.id] }).to_string(),
            &token,
        )
        .await;
    assert_status(&response, StatusCode::CREATED);
    let room_id = body_json(response).await["id"].as_u64().unwrap();

    let response = app
        .get_auth(&format!("/api/v1/rooms/{}", room_id), &token)
        .await;
    assert_status(&response, StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["name"], "general");
    assert_eq!(json["owner_id"], alice.id);
    assert_eq!(json["member_ids"], json!([alice.id, bob.id]));
    assert_eq!(json["members"].as_array().unwrap().len(), 2);
    assert!(json["members"][0].get("password_hash").is_none());
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/rooms/1").await;

    assert_status(&response, StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], 10003);
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let app = TestApp::new().await;

    let response = app.get_auth("/api/v1/rooms/1", "not-a-jwt").await;

    assert_status(&response, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_room_validation() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");

    let response = app
        .post_json_auth(
            "/api/v1/rooms",
            &json!({ "name": "" }).to_string(),
            &token_for(alice.id),
        )
        .await;

    assert_status(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_member_cannot_read_room() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let carol = app.seed_user("carol");
    let room = app.seed_room("private", &alice, &[]);

    let response = app
        .get_auth(&format!("/api/v1/rooms/{}", room.id), &token_for(carol.id))
        .await;

    assert_status(&response, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_room_is_not_found() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");

    let response = app
        .get_auth("/api/v1/rooms/999", &token_for(alice.id))
        .await;

    assert_status(&response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_room_soft_deletes_messages() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let bob = app.seed_user("bob");
    let room = app.seed_room("doomed", &alice, &[bob.id]);
    let uri = format!("/api/v1/rooms/{}", room.id);

    for content in ["one", "two", "three"] {
        let response = app
            .post_json_auth(
                &format!("{}/messages", uri),
                &json!({ "content": content }).to_string(),
                &token_for(bob.id),
            )
            .await;
        assert_status(&response, StatusCode::CREATED);
    }

    // Only the owner may delete.
    let response = app.delete_auth(&uri, &token_for(bob.id)).await;
    assert_status(&response, StatusCode::FORBIDDEN);

    let response = app.delete_auth(&uri, &token_for(alice.id)).await;
    assert_status(&response, StatusCode::NO_CONTENT);

    let response = app.get_auth(&uri, &token_for(alice.id)).await;
    assert_status(&response, StatusCode::NOT_FOUND);

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
    assert!(cleaned, "messages of the deleted room were not cleaned up");
}

// ============================================================================
// Messages
// ============================================================================

#[tokio::test]
async fn test_messages_newest_first_with_limit() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let room = app.seed_room("general", &alice, &[]);
    let token = token_for(alice.id);
    let uri = format!("/api/v1/rooms/{}/messages", room.id);

    for content in ["first", "second", "third"] {
        app.post_json_auth(&uri, &json!({ "content": content }).to_string(), &token)
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let response = app.get_auth(&format!("{}?limit=2", uri), &token).await;
    assert_status(&response, StatusCode::OK);

    let json = body_json(response).await;
    let contents: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["third", "second"]);
}

#[tokio::test]
async fn test_non_member_cannot_post() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let carol = app.seed_user("carol");
    let room = app.seed_room("general", &alice, &[]);

    let response = app
        .post_json_auth(
            &format!("/api/v1/rooms/{}/messages", room.id),
            &json!({ "content": "hi" }).to_string(),
            &token_for(carol.id),
        )
        .await;

    assert_status(&response, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unread_and_mark_read() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let bob = app.seed_user("bob");
    let room = app.seed_room("general", &alice, &[bob.id]);
    let base = format!("/api/v1/rooms/{}", room.id);

    for content in ["hey", "you there?"] {
        app.post_json_auth(
            &format!("{}/messages", base),
            &json!({ "content": content }).to_string(),
            &token_for(bob.id),
        )
        .await;
    }

    let response = app
        .get_auth(&format!("{}/unread", base), &token_for(alice.id))
        .await;
    let json = body_json(response).await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["messages"][0]["content"], "hey");

    let response = app
        .post_json_auth(&format!("{}/read", base), "{}", &token_for(alice.id))
        .await;
    assert_status(&response, StatusCode::NO_CONTENT);

    let response = app
        .get_auth(&format!("{}/unread", base), &token_for(alice.id))
        .await;
    let json = body_json(response).await;
    assert_eq!(json["count"], 0);
    assert!(json["messages"].as_array().unwrap().is_empty());
}

// ============================================================================
// Members
// ============================================================================

#[tokio::test]
async fn test_add_and_remove_member() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let carol = app.seed_user("carol");
    let room = app.seed_room("general", &alice, &[]);
    let base = format!("/api/v1/rooms/{}", room.id);

    let response = app
        .post_json_auth(
            &format!("{}/members", base),
            &json!({ "user_id": carol.id }).to_string(),
            &token_for(alice.id),
        )
        .await;
    assert_status(&response, StatusCode::NO_CONTENT);

    let response = app.get_auth(&base, &token_for(carol.id)).await;
    assert_status(&response, StatusCode::OK);

    // Adding twice is rejected.
    let response = app
        .post_json_auth(
            &format!("{}/members", base),
            &json!({ "user_id": carol.id }).to_string(),
            &token_for(alice.id),
        )
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    let response = app
        .delete_auth(
            &format!("{}/members/{}", base, carol.id),
            &token_for(carol.id),
        )
        .await;
    assert_status(&response, StatusCode::NO_CONTENT);

    let response = app.get_auth(&base, &token_for(carol.id)).await;
    assert_status(&response, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_owner_cannot_be_removed() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice");
    let bob = app.seed_user("bob");
    let room = app.seed_room("general", &alice, &[bob.id]);

    let response = app
        .delete_auth(
            &format!("/api/v1/rooms/{}/members/{}", room.id, alice.id),
            &token_for(alice.id),
        )
        .await;

    assert!(response.status().is_client_error());
}
