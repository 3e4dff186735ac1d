//! WebSocket Connection Handler
//!
//! Authenticates the upgrade request, registers the connection with the hub
//! and pumps frames in both directions until either side closes.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::conn::{ChannelConn, Conn};
use super::error::HubError;
use super::messages::encode_event;
use crate::application::dto::actions::{ActionError, ActionMessage};
use crate::domain::events::{ErrorRaised, Event};
use crate::infrastructure::metrics;
use crate::presentation::middleware::verify_token;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Query string of the upgrade request
#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> Result<Response, AppError> {
    let token = params
        .token
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;
    let user = verify_token(&state.settings.jwt, &token)?;

    let ws_settings = &state.settings.websocket;
    Ok(ws
        .max_message_size(ws_settings.max_message_size)
        .max_frame_size(ws_settings.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state, user.user_id)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, user_id: u64) {
    let (conn, mut outbound) =
        ChannelConn::new(user_id, state.settings.websocket.send_queue_capacity);
    let closed = conn.close_token();
    let hub_conn: Arc<dyn Conn> = conn.clone();

    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = state.hub.connect(hub_conn.clone()).await {
        tracing::debug!(user_id, conn_id = %conn.id(), error = %e, "Connection refused");
        let refusal = Event::new(ErrorRaised {
            error: e.client_message(),
            cause: None,
        });
        if let Ok(frame) = encode_event(&refusal) {
            let _ = sender.send(Message::Text(frame.as_str().into())).await;
        }
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    metrics::WEBSOCKET_CONNECTIONS_ACTIVE.inc();
    tracing::info!(user_id, conn_id = %conn.id(), "WebSocket connected");

    // Forward queued frames to the socket
    let writer_closed = closed.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_closed.cancelled() => break,
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame.as_str().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Main read loop
    loop {
        let msg = tokio::select! {
            _ = closed.cancelled() => break,
            msg = receiver.next() => msg,
        };

        let result = match msg {
            Some(Ok(Message::Text(text))) => match ActionMessage::parse(text.as_str()) {
                Ok(action) => state.hub.send(hub_conn.clone(), action).await,
                Err(e) => state.hub.report_error(hub_conn.clone(), e).await,
            },
            Some(Ok(Message::Binary(_))) => {
                let error = ActionError::Malformed("binary frames are not supported".into());
                state.hub.report_error(hub_conn.clone(), error).await
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => {
                tracing::debug!(user_id, conn_id = %conn.id(), error = %e, "WebSocket error");
                break;
            }
        };

        if let Err(HubError::Closed) = result {
            break;
        }
    }

    // Cleanup
    conn.close();
    state.hub.disconnect(hub_conn).await;
    if let Err(e) = writer.await {
        tracing::debug!(user_id, error = %e, "Writer task failed");
    }
    metrics::WEBSOCKET_CONNECTIONS_ACTIVE.dec();

    tracing::info!(user_id, conn_id = %conn.id(), "WebSocket disconnected");
}
