use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use protocol::PushMessage;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

use crate::{api::ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// GET /api/ws?token= - Subscribe to change notifications
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let authorized = query
        .token
        .as_deref()
        .is_some_and(|token| state.tokens.is_valid(token));
    if !authorized {
        return ApiError::Unauthorized.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut events = state.events.subscribe();
    info!(
        "push subscriber connected ({} total)",
        state.events.receiver_count()
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let msg = match events.recv().await {
                Ok(msg) => msg,
                // Every message means "refetch", so a lagging socket only
                // needs one of the ones it missed.
                Err(RecvError::Lagged(skipped)) => {
                    debug!("push subscriber lagged by {}", skipped);
                    PushMessage::AnnotationsUpdated
                }
                Err(RecvError::Closed) => break,
            };
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize push message: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                debug!("push subscriber went away");
                break;
            }
        }
    });

    // Clients never send anything meaningful; read only to notice the close.
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    send_task.abort();
    info!("push subscriber disconnected");
}
