use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::jwt::verify_token;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Display-layer event stream: `completion_changed` and `badge_earned`
/// events for the authenticated user, delivered as JSON text frames.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let user_id = match authenticate_ws(&state, query.token.as_deref()) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("WebSocket auth failed: {}", e);
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

fn authenticate_ws(state: &AppState, token: Option<&str>) -> Result<Uuid, &'static str> {
    let token = token.ok_or("Missing token query parameter")?;
    let token_data =
        verify_token(token, &state.config).map_err(|_| "Invalid or expired token")?;
    Ok(token_data.claims.sub)
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    tracing::debug!(user_id = %user_id, "WebSocket connection established");

    let Some(tx) = state.ws_tx.as_ref() else {
        tracing::warn!("WebSocket broadcast channel not initialized, closing connection");
        return;
    };
    let mut rx = tx.subscribe();

    // Forward only this user's events; everything published carries a
    // user_id field.
    let uid = user_id.to_string();
    let mut send_task = tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            let for_this_user = serde_json::from_str::<serde_json::Value>(&msg)
                .ok()
                .and_then(|v| v.get("user_id").and_then(|u| u.as_str()).map(|u| u == uid))
                .unwrap_or(false);
            if !for_this_user {
                continue;
            }
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(user_id = %user_id, "WebSocket connection closed");
}
