//! Tutor desk: assignment handling and payment approvals.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tutordesk_core::{Assignment, AssignmentStatus, Transaction};
use uuid::Uuid;

use super::{body, form::Form, AppState};
use crate::errors::{Result, ServiceError};
use crate::lifecycle::{Completion, QueuedAssignment};

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    pub assignment_id: Uuid,
    pub tutor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub assignment_id: Uuid,
    pub status: AssignmentStatus,
    pub tutor_id: Option<Uuid>,
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub transaction_id: Uuid,
    pub approver_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub transaction_id: Uuid,
    pub approver_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct QueueResponse {
    pub success: bool,
    pub count: usize,
    pub assignments: Vec<QueuedAssignment>,
}

#[derive(Serialize)]
pub struct AssignmentResponse {
    pub success: bool,
    pub assignment: Assignment,
}

#[derive(Serialize)]
pub struct CompletionResponse {
    pub success: bool,
    #[serde(rename = "filesUploaded")]
    pub files_uploaded: usize,
    #[serde(flatten)]
    pub completion: Completion,
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub success: bool,
    pub count: usize,
    pub payments: Vec<Transaction>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub success: bool,
    pub transaction: Transaction,
    pub new_balance: Decimal,
    pub advanced_assignments: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub success: bool,
    pub transaction: Transaction,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /tutor/assignments?status=`: newest first.
pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<QueueResponse>> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<AssignmentStatus>()
                .map_err(|_| ServiceError::invalid(format!("unknown status {raw}")))?,
        ),
    };
    let assignments = state.lifecycle.list_all(status).await?;
    Ok(Json(QueueResponse {
        success: true,
        count: assignments.len(),
        assignments,
    }))
}

/// `POST /tutor/accept-assignment`
pub async fn accept_assignment(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<AcceptRequest>, JsonRejection>,
) -> Result<Json<AssignmentResponse>> {
    let req = body(payload)?;
    let assignment = state
        .lifecycle
        .assign(req.assignment_id, req.tutor_id)
        .await?;
    Ok(Json(AssignmentResponse {
        success: true,
        assignment,
    }))
}

/// `POST /tutor/update-assignment-status`
pub async fn update_assignment_status(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<AssignmentResponse>> {
    let req = body(payload)?;
    let assignment = state
        .lifecycle
        .update_status(
            req.assignment_id,
            req.status,
            req.tutor_id,
            req.comments.as_deref(),
        )
        .await?;
    Ok(Json(AssignmentResponse {
        success: true,
        assignment,
    }))
}

/// `POST /tutor/upload-completed-files/:id`: multipart `files`, optional
/// `tutorId` and `comments`.
pub async fn upload_completed_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<CompletionResponse>> {
    let mut form = Form::read(multipart).await?;
    let files = form.take_files("files");
    if files.is_empty() {
        return Err(ServiceError::invalid("no files uploaded"));
    }
    let files_uploaded = files.len();
    let tutor = form.uuid("tutorId")?;
    let completion = state
        .lifecycle
        .complete_with_files(id, files, tutor, form.text("comments"))
        .await?;
    Ok(Json(CompletionResponse {
        success: true,
        files_uploaded,
        completion,
    }))
}

/// `GET /tutor/pending-payments`: oldest first.
pub async fn pending_payments(State(state): State<Arc<AppState>>) -> Result<Json<PendingResponse>> {
    let payments = state.ledger.pending().await?;
    Ok(Json(PendingResponse {
        success: true,
        count: payments.len(),
        payments,
    }))
}

/// `POST /tutor/approve-transaction`
pub async fn approve_transaction(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<Json<ApprovalResponse>> {
    let req = body(payload)?;
    let approval = state
        .ledger
        .approve(req.transaction_id, req.approver_id)
        .await?;
    Ok(Json(ApprovalResponse {
        success: true,
        transaction: approval.transaction,
        new_balance: approval.balance,
        advanced_assignments: approval.advanced,
    }))
}

/// `POST /tutor/reject-transaction`
pub async fn reject_transaction(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>> {
    let req = body(payload)?;
    let transaction = state
        .ledger
        .reject(req.transaction_id, req.approver_id, req.reason.as_deref())
        .await?;
    Ok(Json(TransactionResponse {
        success: true,
        transaction,
    }))
}
