//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure. Every [`TestApp`] runs
//! over its own in-memory store with a live hub and message cleaner.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio::sync::mpsc;
use tower::ServiceExt;

use chat_hub::application::event_bus::EventBus;
use chat_hub::config::{
    CorsSettings, DatabaseSettings, HubSettings, JwtSettings, ServerSettings, Settings,
    WebSocketSettings,
};
use chat_hub::domain::{Room, User};
use chat_hub::infrastructure::memory::MemoryStore;
use chat_hub::presentation::middleware::Claims;
use chat_hub::presentation::websocket::{ChannelConn, EncodedEvent};
use chat_hub::startup::{build_router, build_state, AppState, Background};

pub const JWT_SECRET: &str = "integration-test-secret-with-32-chars!";

/// Settings for tests: no database, small queues.
pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseSettings {
            url: None,
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: 5,
        },
        jwt: JwtSettings {
            secret: JWT_SECRET.into(),
            leeway_secs: 0,
        },
        cors: CorsSettings {
            allowed_origins: vec![],
        },
        websocket: WebSocketSettings {
            max_message_size: 65536,
            max_frame_size: 16384,
            send_queue_capacity: 64,
        },
        hub: HubSettings {
            channel_capacity: 64,
            event_bus_capacity: 256,
        },
        environment: "test".into(),
    }
}

/// Test application builder
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub bus: Arc<EventBus>,
    background: Option<Background>,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let (state, background) =
            build_state(test_settings(), store.clone()).expect("failed to build state");
        let router = build_router(state.clone());
        let bus = background.bus().clone();

        Self {
            router,
            state,
            store,
            bus,
            background: Some(background),
        }
    }

    /// Insert a user with a generated full name. Returns the user.
    pub fn seed_user(&self, name: &str) -> User {
        let mut user = User::new(name);
        user.first_name = FirstName().fake();
        user.last_name = LastName().fake();
        user.id = self.store.insert_user(user.clone());
        user
    }

    /// Insert two users who are already friends.
    pub fn seed_friends(&self, a: &str, b: &str) -> (User, User) {
        let mut first = User::new(a);
        let mut second = User::new(b);
        first.id = self.store.insert_user(first.clone());
        second.id = self.store.insert_user(second.clone());

        first.friend_ids.insert(second.id);
        second.friend_ids.insert(first.id);
        self.store.insert_user(first.clone());
        self.store.insert_user(second.clone());
        (first, second)
    }

    /// Insert a room owned by `owner` with the given extra members.
    pub fn seed_room(&self, name: &str, owner: &User, members: &[u64]) -> Room {
        let mut room = Room::new(name, owner, members.iter().copied(), false)
            .expect("invalid room fixture");
        room.id = self.store.insert_room(room.clone());
        room
    }

    /// Stop the hub and cleaner.
    pub async fn shutdown(&mut self) {
        if let Some(background) = self.background.take() {
            background.shutdown().await;
        }
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().method("GET").uri(uri), Body::empty())
            .await
    }

    pub async fn get_auth(&self, uri: &str, token: &str) -> Response {
        self.send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("Authorization", format!("Bearer {}", token)),
            Body::empty(),
        )
        .await
    }

    pub async fn post_json_auth(&self, uri: &str, body: &str, token: &str) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", token)),
            Body::from(body.to_string()),
        )
        .await
    }

    pub async fn delete_auth(&self, uri: &str, token: &str) -> Response {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .header("Authorization", format!("Bearer {}", token)),
            Body::empty(),
        )
        .await
    }

    async fn send(&self, builder: axum::http::request::Builder, body: Body) -> Response {
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }
}

/// Mint a token for `user_id`, valid for ten minutes.
pub fn token_for(user_id: u64) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}

/// A hub connection for `user_id` with its outbound queue.
pub fn conn(user_id: u64) -> (Arc<ChannelConn>, mpsc::Receiver<EncodedEvent>) {
    ChannelConn::new(user_id, 64)
}

/// Next frame on a connection, decoded.
pub async fn next_frame(rx: &mut mpsc::Receiver<EncodedEvent>) -> serde_json::Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("connection queue closed");
    serde_json::from_str(frame.as_str()).unwrap()
}

/// Next frame with the given event tag, skipping others.
pub async fn next_event(rx: &mut mpsc::Receiver<EncodedEvent>, tag: &str) -> serde_json::Value {
    loop {
        let frame = next_frame(rx).await;
        if frame["event"] == tag {
            return frame;
        }
    }
}

/// Assert that nothing arrives within a short window.
pub async fn assert_silent(rx: &mut mpsc::Receiver<EncodedEvent>) {
    let result = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}

/// Poll `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
