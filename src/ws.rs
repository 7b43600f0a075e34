//! WebSocket connection lifecycle: one socket per session.
//!
//! The socket owns nothing. It resolves the first frame into an attach
//! intent, then pumps frames into the room's queue and events back out;
//! all decisions happen inside the room actor.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::code::RoomCode;
use crate::error::RoomError;
use crate::protocol::{ClientToServer, ServerToClient};
use crate::room::registry::RoomRegistry;
use crate::room::{AttachIntent, RoomHandle, SessionId};

#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomRegistry,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Ok(code) = code.parse::<RoomCode>() else {
        return (StatusCode::BAD_REQUEST, "invalid room code").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state.rooms, code))
}

async fn handle_socket(socket: WebSocket, rooms: RoomRegistry, code: RoomCode) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (sv_tx, sv_rx) = mpsc::unbounded_channel::<ServerToClient>();
    let session: SessionId = Uuid::new_v4();

    // Writer: drain server events to the socket; closing the channel closes
    // the socket.
    let mut writer = tokio::spawn(forward_events(sv_rx, ws_tx));

    // The first frame must declare identity: join or reconnect.
    let room: Option<RoomHandle> = loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<ClientToServer>(&text) {
                    Ok(ClientToServer::Join { name }) => {
                        let room = rooms.ensure(code);
                        room.attach(session, AttachIntent::Join { name }, sv_tx.clone());
                        break Some(room);
                    }
                    Ok(ClientToServer::Reconnect { player_id }) => match rooms.lookup(code) {
                        Some(room) => {
                            room.attach(
                                session,
                                AttachIntent::Reconnect { player_id },
                                sv_tx.clone(),
                            );
                            break Some(room);
                        }
                        None => {
                            // Terminal: the room no longer exists and a
                            // reconnect must not recreate it.
                            send_error(&sv_tx, RoomError::RoomNotFound);
                            break None;
                        }
                    },
                    Ok(ClientToServer::Ping) => {
                        let _ = sv_tx.send(ServerToClient::Pong);
                    }
                    Ok(_) => {
                        send_error(
                            &sv_tx,
                            RoomError::InvalidTransition { phase: "UNATTACHED" },
                        );
                    }
                    Err(err) => {
                        debug!(%session, %err, "undecodable first frame");
                        send_error(&sv_tx, RoomError::SessionInvalid);
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => break None,
            Some(Ok(_)) => {}
            Some(Err(_)) => break None,
        }
    };

    let Some(room) = room else {
        drop(sv_tx);
        let _ = writer.await;
        return;
    };

    // The room now holds the only sender: a rejected attach, a kick, a
    // superseding reconnect, or room teardown closes the channel, the
    // writer sends its Close frame, and the pump below unwinds.
    drop(sv_tx);
    let mut writer_done = false;
    loop {
        tokio::select! {
            _ = &mut writer => {
                writer_done = true;
                break;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientToServer>(&text) {
                        Ok(cmd) => room.command(session, cmd),
                        Err(err) => {
                            debug!(room = %room.code, %session, %err, "bad frame dropped");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            }
        }
    }
    // Socket gone without a leave: the player is Disconnected, never Left,
    // so their identity survives for reconnect.
    room.detach(session);
    if !writer_done {
        let _ = writer.await;
    }
}

async fn forward_events(
    mut sv_rx: mpsc::UnboundedReceiver<ServerToClient>,
    mut ws_tx: futures::stream::SplitSink<WebSocket, Message>,
) {
    while let Some(event) = sv_rx.recv().await {
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(err) => {
                debug!(%err, "unencodable event");
                continue;
            }
        };
        if ws_tx.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}

fn send_error(tx: &mpsc::UnboundedSender<ServerToClient>, err: RoomError) {
    let _ = tx.send(ServerToClient::Error {
        code: err.code(),
        message: err.to_string(),
    });
}
