use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::errors::{Result, ServiceError};

/// `GET /file/:id`: stored bytes with their content type, as an attachment.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    let store = state.blobs.as_ref().ok_or(ServiceError::StorageUnavailable)?;
    let blob = store.get(&id).await?;

    let content_type = HeaderValue::from_str(&blob.metadata.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    // Quotes and control characters would break the header.
    let filename: String = blob
        .metadata
        .filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        blob.bytes,
    )
        .into_response())
}
