//! Realtime chat relay.
//!
//! Messages are authorized against their assignment, normalized, stored and
//! then fanned out through the [`Registry`] to SSE streams ([`sse`]) and
//! WebSocket rooms ([`ws`]).

pub mod registry;
pub mod sse;
pub mod ws;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::info;
use tutordesk_core::{chat, Message, Sender};
use uuid::Uuid;

use crate::db::{assignments, messages};
use crate::errors::{Result, ServiceError};

pub use registry::{Delivery, Membership, Registry, Transport, OUTBOX_CAPACITY};

#[derive(Debug, Clone)]
pub struct SendMessage {
    pub assignment_id: Uuid,
    pub sender: Sender,
    pub student_id: Option<Uuid>,
    pub tutor_id: Option<Uuid>,
    pub content: String,
}

/// Event pushed to subscribers, on both transports.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent<'a> {
    Message { message: &'a Message },
}

#[derive(Clone)]
pub struct ChatRelay {
    pool: SqlitePool,
    registry: Arc<Registry>,
}

impl ChatRelay {
    pub fn new(pool: SqlitePool, registry: Arc<Registry>) -> Self {
        Self { pool, registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Authorize, store and broadcast one message.
    pub async fn send(&self, input: SendMessage) -> Result<Message> {
        let content = chat::normalize_content(&input.content)?;

        let mut conn = self.pool.acquire().await?;
        let assignment = assignments::get_assignment(&mut conn, input.assignment_id)
            .await?
            .ok_or(ServiceError::not_found("assignment"))?;
        let participants =
            chat::authorize(&assignment, input.sender, input.student_id, input.tutor_id)?;

        let message = Message {
            id: Uuid::new_v4(),
            assignment_id: assignment.id,
            student_id: participants.student_id,
            tutor_id: participants.tutor_id,
            sender: input.sender,
            content,
            created_at: Utc::now(),
        };
        messages::insert_message(&mut conn, &message).await?;
        drop(conn);

        let delivered = self.registry.publish(Arc::new(message.clone()));
        info!(
            assignment = %message.assignment_id,
            message = %message.id,
            sender = %message.sender,
            delivered,
            "Chat message stored"
        );
        Ok(message)
    }

    /// Chat history of an assignment, oldest first.
    pub async fn history(&self, assignment_id: Uuid) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.require_assignment(&mut conn, assignment_id).await?;
        messages::list_for_assignment(&mut conn, assignment_id).await
    }

    /// Open a stream subscription with its own outbox.
    pub async fn subscribe_stream(
        &self,
        assignment_id: Uuid,
        client_id: Option<String>,
    ) -> Result<(Membership, mpsc::Receiver<Delivery>)> {
        let mut conn = self.pool.acquire().await?;
        self.require_assignment(&mut conn, assignment_id).await?;
        let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);
        let membership =
            self.registry
                .subscribe(assignment_id, client_id, Transport::Stream, outbox);
        Ok((membership, inbox))
    }

    /// Join a room, delivering into a connection-wide `outbox`.
    pub async fn join_room(
        &self,
        assignment_id: Uuid,
        client_id: Option<String>,
        outbox: mpsc::Sender<Delivery>,
    ) -> Result<Membership> {
        let mut conn = self.pool.acquire().await?;
        self.require_assignment(&mut conn, assignment_id).await?;
        Ok(self
            .registry
            .subscribe(assignment_id, client_id, Transport::Room, outbox))
    }

    async fn require_assignment(
        &self,
        conn: &mut sqlx::SqliteConnection,
        assignment_id: Uuid,
    ) -> Result<()> {
        if assignments::get_assignment(conn, assignment_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::not_found("assignment"));
        }
        Ok(())
    }
}
