use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tutordesk_core::{PaymentMethod, Transaction};
use uuid::Uuid;

use super::{body, form::Form, AppState};
use crate::errors::{Result, ServiceError};
use crate::ledger::{CreditOutcome, CreditRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantPaymentRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    /// Wallet address, account or email the money goes to.
    pub destination: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub user_id: Uuid,
    pub assignment_id: Uuid,
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct CreditResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: CreditOutcome,
}

#[derive(Serialize)]
pub struct RequestResponse {
    pub success: bool,
    pub transaction: Transaction,
}

/// `POST /payments/instant`: card/processor credits, applied immediately.
pub async fn instant(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<InstantPaymentRequest>, JsonRejection>,
) -> Result<Json<CreditResponse>> {
    let req = body(payload)?;
    if !req.method.is_instant() {
        return Err(ServiceError::invalid(format!(
            "{} payments need a proof upload",
            req.method
        )));
    }
    let outcome = state
        .ledger
        .record_credit(CreditRequest {
            user_id: req.user_id,
            amount: req.amount,
            method: req.method,
            reference: req.reference,
            proof: None,
        })
        .await?;
    Ok(Json(CreditResponse {
        success: true,
        outcome,
    }))
}

/// `POST /payments/proof`: multipart `proof`, `userId`, `amount`, `method`
/// and optional `reference`. Creates a pending credit.
pub async fn proof(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CreditResponse>)> {
    let mut form = Form::read(multipart).await?;
    let method: PaymentMethod = form.required("method")?;
    if !method.requires_proof() {
        return Err(ServiceError::invalid(format!(
            "{method} payments do not take a proof"
        )));
    }
    let proof = form.take_files("proof").into_iter().next();
    let outcome = state
        .ledger
        .record_credit(CreditRequest {
            user_id: form.required("userId")?,
            amount: form.decimal("amount")?,
            method,
            reference: form.text("reference").map(str::to_string),
            proof,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreditResponse {
            success: true,
            outcome,
        }),
    ))
}

/// `POST /payments/request-withdraw`
pub async fn request_withdraw(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RequestResponse>)> {
    let req = body(payload)?;
    let transaction = state
        .ledger
        .request_withdrawal(req.user_id, req.amount, req.method, req.destination)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RequestResponse {
            success: true,
            transaction,
        }),
    ))
}

/// `POST /payments/request-refund`
pub async fn request_refund(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RefundRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RequestResponse>)> {
    let req = body(payload)?;
    let transaction = state
        .ledger
        .request_refund(req.user_id, req.assignment_id, req.amount, req.reason)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RequestResponse {
            success: true,
            transaction,
        }),
    ))
}
