//! Per-connection lifecycle: upgrade, registration, session loop, teardown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ConnectInfo, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::protocol::{self, Availability, ServerEvent};
use crate::server::registry::{ConnectionId, RegisterOutcome};
use crate::server::request;
use crate::server::state::{AppState, ConnectQuery};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let identifier = query.name;
    if identifier.is_empty()
        || identifier == protocol::PUBLIC_CHANNEL
        || identifier.len() > protocol::MAX_FIELD_LEN
    {
        state.events.record(&format!(
            "connection from {remote_addr} rejected: invalid identifier"
        ));
        return Err(StatusCode::BAD_REQUEST);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let connection = match state.registry.register(&identifier, tx, remote_addr).await {
        RegisterOutcome::DuplicateRejected => {
            state.events.record(&format!(
                "connection from {remote_addr} rejected: {identifier} is already connected"
            ));
            return Err(StatusCode::CONFLICT);
        }
        RegisterOutcome::Fresh(connection) => {
            state.events.record(&format!(
                "participant {identifier} connected from {remote_addr}"
            ));
            connection
        }
        RegisterOutcome::Reactivated(connection) => {
            state.events.record(&format!(
                "participant {identifier} reconnected from {remote_addr}"
            ));
            connection
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identifier, connection, rx)))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    identifier: String,
    connection: ConnectionId,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let (mut sender, mut receiver) = socket.split();

    // The whole membership learns about the newcomer, the newcomer included.
    let joined = ServerEvent::ParticipantJoined {
        identifier: identifier.clone(),
    };
    state.registry.broadcast(&joined.encode()).await;

    // Sole writer of this socket: frames enqueued by any component leave the
    // mailbox one at a time, so they are never interleaved byte-wise.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Binary(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let recv_identifier = identifier.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            let message = match message {
                Ok(message) => message,
                Err(error) => {
                    recv_state.events.record(&format!(
                        "read error on connection of {recv_identifier}: {error}"
                    ));
                    break;
                }
            };

            match message {
                Message::Binary(frame) => {
                    request::apply(&recv_state, &recv_identifier, &frame).await;
                }
                Message::Text(_) => {
                    recv_state
                        .events
                        .record(&format!("dropping text frame from {recv_identifier}"));
                }
                Message::Close(_) => {
                    recv_state
                        .events
                        .record(&format!("connection closed by {recv_identifier}"));
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other.
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    }

    // Only the session that still owns the record tears it down; a stale
    // close after a fast reconnect must not knock the new session offline.
    if state.registry.disconnect(&identifier, connection).await {
        state
            .events
            .record(&format!("participant {identifier} marked offline"));
        let update = ServerEvent::AvailabilityUpdate {
            identifier,
            availability: Availability::Offline,
        };
        state.registry.broadcast(&update.encode()).await;
    }
}
