use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use tutordesk_core::{Assignment, Role, Transaction, User};
use uuid::Uuid;

use super::{body, AppState};
use crate::db::users as user_rows;
use crate::errors::{Result, ServiceError};
use crate::ledger::BalanceCheck;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub role: Option<Role>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: User,
}

#[derive(Serialize)]
pub struct OrdersResponse {
    pub success: bool,
    pub count: usize,
    pub orders: Vec<Assignment>,
}

#[derive(Serialize)]
pub struct PaymentsResponse {
    pub success: bool,
    pub count: usize,
    pub payments: Vec<Transaction>,
}

#[derive(Serialize)]
pub struct BalanceCheckResponse {
    pub success: bool,
    #[serde(flatten)]
    pub check: BalanceCheck,
}

/// `POST /users`
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let req = body(payload)?;
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(ServiceError::invalid("name is required"));
    }
    if !email.contains('@') {
        return Err(ServiceError::invalid("a valid email is required"));
    }

    let mut conn = state.pool.acquire().await?;
    if user_rows::email_taken(&mut conn, &email).await? {
        return Err(ServiceError::invalid("email is already registered"));
    }
    let user = User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email,
        role: req.role.unwrap_or(Role::Student),
        balance: Decimal::ZERO,
        version: 0,
        created_at: Utc::now(),
    };
    user_rows::insert_user(&mut conn, &user).await?;
    info!(user = %user.id, role = %user.role, "User created");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            success: true,
            user,
        }),
    ))
}

/// `GET /users/:id`
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>> {
    let mut conn = state.pool.acquire().await?;
    let user = user_rows::get_user(&mut conn, id)
        .await?
        .ok_or(ServiceError::not_found("user"))?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

/// `GET /users/:id/orders`: newest first.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrdersResponse>> {
    let orders = state.lifecycle.list_for_owner(id).await?;
    Ok(Json(OrdersResponse {
        success: true,
        count: orders.len(),
        orders,
    }))
}

/// `GET /users/:id/payments`: newest first.
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentsResponse>> {
    let payments = state.ledger.history(id).await?;
    Ok(Json(PaymentsResponse {
        success: true,
        count: payments.len(),
        payments,
    }))
}

/// `GET /users/:id/balance-check`
pub async fn balance_check(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BalanceCheckResponse>> {
    let check = state.ledger.balance_check(id).await?;
    Ok(Json(BalanceCheckResponse {
        success: true,
        check,
    }))
}
