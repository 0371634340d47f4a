use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tutordesk_core::{Assignment, OrderType};
use uuid::Uuid;

use super::{body, form::Form, AppState};
use crate::blob::IncomingFile;
use crate::errors::{Result, ServiceError};
use crate::lifecycle::NewAssignment;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub order_type: OrderType,
    pub subject: String,
    #[serde(default)]
    pub assignment_title: String,
    pub description: String,
    #[serde(default)]
    pub additional_requirements: String,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub price_per_page: Decimal,
    #[serde(default)]
    pub total_cost: Decimal,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order: Assignment,
}

impl CreateOrderRequest {
    /// Read the same fields from a multipart body.
    fn from_form(form: &Form) -> Result<Self> {
        let text = |name: &str| form.text(name).unwrap_or_default().to_string();
        Ok(Self {
            user_id: form.required("userId")?,
            order_type: form.required("orderType")?,
            subject: text("subject"),
            assignment_title: text("assignmentTitle"),
            description: text("description"),
            additional_requirements: text("additionalRequirements"),
            deadline: form.required("deadline")?,
            pages: form.parsed("pages")?.unwrap_or_default(),
            price_per_page: form.parsed("pricePerPage")?.unwrap_or_default(),
            total_cost: form.parsed("totalCost")?.unwrap_or_default(),
        })
    }

    fn into_new(self, files: Vec<IncomingFile>) -> NewAssignment {
        NewAssignment {
            owner_id: self.user_id,
            order_type: self.order_type,
            subject: self.subject,
            title: self.assignment_title,
            description: self.description,
            additional_requirements: self.additional_requirements,
            deadline: self.deadline,
            pages: self.pages,
            price_per_page: self.price_per_page,
            total_cost: self.total_cost,
            files,
        }
    }
}

/// `POST /orders`
///
/// Takes JSON, or a multipart body with the same fields as text parts plus
/// brief files under `files`. The category is derived from `orderType`; a
/// client-sent category is ignored.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<(StatusCode, Json<OrderResponse>)> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let input = if is_multipart {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|rejection| ServiceError::invalid(rejection.body_text()))?;
        let mut form = Form::read(multipart).await?;
        let files = form.take_files("files");
        CreateOrderRequest::from_form(&form)?.into_new(files)
    } else {
        body(Json::<CreateOrderRequest>::from_request(req, &state).await)?.into_new(Vec::new())
    };

    let order = state.lifecycle.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            success: true,
            order,
        }),
    ))
}

/// `GET /orders/:id`
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>> {
    let order = state.lifecycle.get(id).await?;
    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}

/// `POST /orders/:id/files`: multipart `files`, optional `userId`.
pub async fn attach_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<OrderResponse>> {
    let mut form = Form::read(multipart).await?;
    let files = form.take_files("files");
    if files.is_empty() {
        return Err(ServiceError::invalid("no files uploaded"));
    }
    let uploaded_by = form.uuid("userId")?;
    let order = state.lifecycle.attach_files(id, uploaded_by, files).await?;
    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}
