// src/handlers/ws.rs

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    handlers::session::{self, Connection},
    models::message::ClientMessage,
    room::Outbound,
    state::AppState,
    utils::jwt::{Claims, verify_jwt},
};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Upgrades to a WebSocket once the `token` query parameter verifies.
/// Anything else is refused with 401 before the upgrade.
pub async fn connect(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(token) = params.token.as_deref() else {
        tracing::warn!("WebSocket upgrade refused: missing token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let claims = match verify_jwt(token, &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("WebSocket upgrade refused: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

async fn handle_socket(socket: WebSocket, state: AppState, claims: Claims) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let mut conn = Connection::new(&claims.sub, tx);
    tracing::info!(
        "WebSocket connected | User: {} | Connection: {}",
        conn.user_id,
        conn.id
    );

    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let frame = match outbound {
                Outbound::Message(message) => match serde_json::to_string(&message) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::error!("Failed to encode frame: {}", e);
                        continue;
                    }
                },
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(frame) => session::dispatch(&state, &mut conn, frame).await,
                Err(e) => tracing::warn!(
                    "Ignoring unreadable frame from {}: {}",
                    conn.user_id,
                    e
                ),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    session::disconnect(&state, &conn).await;
    writer.abort();
    tracing::info!(
        "WebSocket disconnected | User: {} | Connection: {}",
        conn.user_id,
        conn.id
    );
}
