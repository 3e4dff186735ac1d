//! Route Configuration
//!
//! Configures all HTTP routes for the API.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::auth_middleware;
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        // WebSocket gateway; authenticates with `?token=`
        .route("/ws", get(ws_handler))
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes, all authenticated
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/users", user_routes())
        .nest("/rooms", room_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/@me/relation", get(handlers::user::get_relation))
        .route("/@me/friends", post(handlers::user::add_friend))
}

fn room_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::room::create_room))
        .route(
            "/{room_id}",
            get(handlers::room::get_room).delete(handlers::room::delete_room),
        )
        .route(
            "/{room_id}/messages",
            get(handlers::room::get_messages).post(handlers::room::post_message),
        )
        .route("/{room_id}/unread", get(handlers::room::get_unread))
        .route("/{room_id}/read", post(handlers::room::mark_read))
        .route("/{room_id}/members", post(handlers::room::add_member))
        .route(
            "/{room_id}/members/{user_id}",
            delete(handlers::room::remove_member),
        )
}
