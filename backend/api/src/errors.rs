//! Application-wide error types.
//!
//! [`ServiceError`] is what every service and handler returns. It wraps the
//! domain taxonomy from `tutordesk_core` and adds the infrastructure failures.
//! Its [`IntoResponse`] impl is the single place where failures become HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use tutordesk_core::DomainError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("File storage not initialized")]
    StorageUnavailable,

    #[error("Concurrent update lost after {0} attempts")]
    Conflict(u32),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::InvalidInput(msg.into()))
    }

    pub fn not_found(what: &'static str) -> Self {
        Self::Domain(DomainError::NotFound(what))
    }

    /// Stable machine-readable kind for the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::NotFound(_)) => "not_found",
            Self::Domain(DomainError::Forbidden(_)) => "forbidden",
            Self::Domain(DomainError::InvalidInput(_)) => "invalid_input",
            Self::Domain(DomainError::InsufficientBalance { .. }) => "insufficient_balance",
            Self::Domain(DomainError::InvalidTransition { .. }) => "invalid_transition",
            Self::Domain(DomainError::AlreadyResolved) => "already_resolved",
            Self::StorageUnavailable => "storage_unavailable",
            Self::Conflict(_) => "conflict",
            _ => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Domain(DomainError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Domain(DomainError::Forbidden(_)) => StatusCode::FORBIDDEN,
            Self::Domain(DomainError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::Domain(DomainError::InsufficientBalance { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Domain(DomainError::InvalidTransition { .. })
            | Self::Domain(DomainError::AlreadyResolved)
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Decimal>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let (balance, required) = match &self {
            Self::Domain(DomainError::InsufficientBalance { balance, required }) => {
                (Some(*balance), Some(*required))
            }
            _ => (None, None),
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                kind: self.kind(),
                message,
                balance,
                required,
            }),
        )
            .into_response()
    }
}
