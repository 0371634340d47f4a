//! `GET /ws`: WebSocket room transport.
//!
//! Clients join and leave assignment rooms with JSON frames:
//!
//! ```text
//! → {"type":"chat:join","assignmentId":"…","clientId":"…"}
//! ← {"type":"chat:joined","assignmentId":"…"}
//! → {"type":"chat:leave","assignmentId":"…"}
//! ← {"type":"chat:left","assignmentId":"…"}
//! ← {"type":"message","message":{…}}
//! ← {"type":"error","kind":"not_found","message":"…"}
//! ```
//!
//! `message` frames are pushed only to rooms joined with a `clientId`; a
//! join without one is acknowledged but receives chat over `/messages/stream`.
//! One outbox per connection collects deliveries from every joined room.
//! The ping timer, the outbox and all memberships live on the connection
//! task and go away with it.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tutordesk_core::Message;
use uuid::Uuid;

use super::{Delivery, Membership, OUTBOX_CAPACITY};
use crate::api::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientFrame {
    #[serde(rename = "chat:join", rename_all = "camelCase")]
    Join {
        assignment_id: Uuid,
        client_id: Option<String>,
    },
    #[serde(rename = "chat:leave", rename_all = "camelCase")]
    Leave { assignment_id: Uuid },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ServerFrame<'a> {
    #[serde(rename = "chat:joined", rename_all = "camelCase")]
    Joined { assignment_id: Uuid },
    #[serde(rename = "chat:left", rename_all = "camelCase")]
    Left { assignment_id: Uuid },
    #[serde(rename = "message")]
    Message { message: &'a Message },
    #[serde(rename = "error")]
    Error { kind: &'static str, message: String },
}

fn frame(f: &ServerFrame<'_>) -> WsMessage {
    match serde_json::to_string(f) {
        Ok(text) => WsMessage::Text(text),
        Err(e) => {
            warn!(error = %e, "Failed to encode WebSocket frame");
            WsMessage::Text(r#"{"type":"error","kind":"internal","message":"encoding failed"}"#.into())
        }
    }
}

pub async fn upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run(state, socket))
}

struct Connection {
    state: Arc<AppState>,
    outbox: mpsc::Sender<Delivery>,
    rooms: HashMap<Uuid, Membership>,
}

impl Connection {
    async fn handle_text(&mut self, text: &str) -> WsMessage {
        let reply = match serde_json::from_str::<ClientFrame>(text) {
            Err(e) => ServerFrame::Error {
                kind: "invalid_input",
                message: format!("Invalid frame: {e}"),
            },
            Ok(ClientFrame::Join {
                assignment_id,
                client_id,
            }) => self.join(assignment_id, client_id).await,
            Ok(ClientFrame::Leave { assignment_id }) => {
                self.rooms.remove(&assignment_id);
                ServerFrame::Left { assignment_id }
            }
        };
        frame(&reply)
    }

    async fn join(&mut self, assignment_id: Uuid, client_id: Option<String>) -> ServerFrame<'static> {
        if self.rooms.contains_key(&assignment_id) {
            return ServerFrame::Joined { assignment_id };
        }
        match self
            .state
            .chat
            .join_room(assignment_id, client_id, self.outbox.clone())
            .await
        {
            Ok(membership) => {
                self.rooms.insert(assignment_id, membership);
                ServerFrame::Joined { assignment_id }
            }
            Err(e) => ServerFrame::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

async fn run(state: Arc<AppState>, socket: WebSocket) {
    let (mut sink, mut frames) = socket.split();
    let (outbox, mut inbox) = mpsc::channel::<Delivery>(OUTBOX_CAPACITY);
    let shutdown = state.shutdown.clone();
    let mut ping = tokio::time::interval(state.config.ws_ping());
    // The first tick completes immediately.
    ping.tick().await;

    let mut conn = Connection {
        state,
        outbox,
        rooms: HashMap::new(),
    };
    debug!("WebSocket connected");

    loop {
        let outgoing = tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
            _ = ping.tick() => WsMessage::Ping(Vec::new()),
            Some(delivery) = inbox.recv() => frame(&ServerFrame::Message {
                message: delivery.as_ref(),
            }),
            incoming = frames.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => conn.handle_text(&text).await,
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket receive failed");
                    break;
                }
            },
        };
        if let Err(e) = sink.send(outgoing).await {
            debug!(error = %e, "WebSocket send failed");
            break;
        }
    }

    debug!(rooms = conn.rooms.len(), "WebSocket closed");
}
