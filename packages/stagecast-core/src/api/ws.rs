//! WebSocket handler for real-time stage communication.
//!
//! Each connection gets its own outbound `mpsc` channel, registered with the
//! [`Registry`](crate::registry::Registry) under a freshly minted user ID.
//! Inbound frames are parsed into [`Inbound`] and handed to the dispatcher
//! one at a time, in arrival order, so the per-connection sequencing
//! guarantee in §5 holds without any extra locking here.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::model::User;
use crate::protocol::{Inbound, Outbound, RoomSummary};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main WebSocket connection handler: one per connected client for the
/// lifetime of the socket.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();
    log::info!("[ws] connection established: {}", conn_guard.id());

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let user = User::new();
    let user_id = user.id.clone();
    state.registry.register_user(user, tx);

    let public_rooms: Vec<RoomSummary> = state
        .registry
        .rooms_snapshot()
        .iter()
        .filter(|r| r.is_public)
        .map(RoomSummary::from_room)
        .collect();
    state.registry.send_to(
        &user_id,
        &Outbound::Connected { user_id: user_id.clone(), public_rooms },
    );

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[ws] connection force-closed: {}", conn_guard.id());
                break;
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Some(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Inbound>(&text) {
                            Ok(msg) => state.dispatcher.dispatch(&user_id, msg),
                            Err(e) => log::debug!("[ws] dropping malformed frame: {e}"),
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Binary(_))) => {}
                }
            }
        }
    }

    state.dispatcher.disconnect(&user_id);
    log::info!("[ws] connection closed: {}", conn_guard.id());
}
