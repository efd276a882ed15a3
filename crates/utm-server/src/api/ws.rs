//! WebSocket stream of live events.
//!
//! Clients only send keep-alives; the server pushes `{type, data}` JSON in publish order.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use std::sync::Arc;

use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut subscription = state.broadcaster().subscribe();
    let subscriber_id = subscription.id;
    tracing::debug!(subscriber_id, "WebSocket connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            event = subscription.rx.recv() => {
                match event {
                    Some(payload) => {
                        if socket.send(Message::Text(payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    // Dropped by the broadcaster (queue full)
                    None => break,
                }
            }
        }
    }

    state.broadcaster().unsubscribe(subscriber_id);
    tracing::debug!(subscriber_id, "WebSocket disconnected");
}
