//! `GET /messages/stream`: server-sent events transport.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ChatEvent, Delivery};
use crate::api::AppState;
use crate::errors::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub assignment_id: Uuid,
    pub client_id: Option<String>,
}

fn to_event(message: &Delivery) -> Event {
    match serde_json::to_string(&ChatEvent::Message {
        message: message.as_ref(),
    }) {
        Ok(json) => Event::default()
            .event("message")
            .id(message.id.to_string())
            .data(json),
        Err(e) => {
            warn!(error = %e, message = %message.id, "Failed to encode chat event");
            Event::default().comment("encoding failed")
        }
    }
}

/// One `message` event per chat message, keep-alive comments while idle.
///
/// The membership travels inside the stream, so the subscription and its
/// keep-alive timer end together when the client disconnects or the server
/// shuts down.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let (membership, inbox) = state
        .chat
        .subscribe_stream(query.assignment_id, query.client_id)
        .await?;
    debug!(assignment = %membership.assignment_id(), "SSE subscriber connected");

    let shutdown = state.shutdown.clone();
    let events = stream::unfold(
        (inbox, membership, shutdown),
        |(mut inbox, membership, shutdown)| async move {
            let message = tokio::select! {
                _ = shutdown.cancelled() => return None,
                message = inbox.recv() => message?,
            };
            Some((
                Ok::<_, Infallible>(to_event(&message)),
                (inbox, membership, shutdown),
            ))
        },
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(state.config.sse_keepalive())))
}
