use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tutordesk_core::{Message, Sender};
use uuid::Uuid;

use super::{body, AppState};
use crate::chat::SendMessage;
use crate::errors::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub assignment_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub assignment_id: Uuid,
    pub sender: Sender,
    pub student_id: Option<Uuid>,
    pub tutor_id: Option<Uuid>,
    pub content: String,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub count: usize,
    pub messages: Vec<Message>,
}

#[derive(Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub message: Message,
}

/// `GET /messages?assignmentId=`: oldest first.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let messages = state.chat.history(query.assignment_id).await?;
    Ok(Json(HistoryResponse {
        success: true,
        count: messages.len(),
        messages,
    }))
}

/// `POST /messages`
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>> {
    let req = body(payload)?;
    let message = state
        .chat
        .send(SendMessage {
            assignment_id: req.assignment_id,
            sender: req.sender,
            student_id: req.student_id,
            tutor_id: req.tutor_id,
            content: req.content,
        })
        .await?;
    Ok(Json(SendResponse {
        success: true,
        message,
    }))
}
