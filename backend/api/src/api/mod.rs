//! Axum REST API: shared state, router and request helpers.

mod files;
mod form;
mod messages;
mod orders;
mod payments;
mod tutor;
mod users;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::blob::BlobStore;
use crate::chat::{self, ChatRelay, Registry};
use crate::config::Config;
use crate::errors::{Result, ServiceError};
use crate::ledger::Ledger;
use crate::lifecycle::Lifecycle;
use crate::notify::Notifier;

pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub blobs: Option<Arc<dyn BlobStore>>,
    pub ledger: Ledger,
    pub lifecycle: Lifecycle,
    pub chat: ChatRelay,
    /// Cancelled on shutdown; long-lived connections watch it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        config: Config,
        blobs: Option<Arc<dyn BlobStore>>,
        notifier: Arc<dyn Notifier>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ledger: Ledger::new(pool.clone(), blobs.clone(), Arc::clone(&notifier)),
            lifecycle: Lifecycle::new(pool.clone(), blobs.clone(), notifier),
            chat: ChatRelay::new(pool.clone(), Registry::new()),
            pool,
            config,
            blobs,
            shutdown,
        }
    }
}

/// Build the full HTTP surface over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        // ─── Users ────────────────────────────────────────
        .route("/users", post(users::create_user))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/orders", get(users::list_orders))
        .route("/users/:id/payments", get(users::list_payments))
        .route("/users/:id/balance-check", get(users::balance_check))
        // ─── Orders ───────────────────────────────────────
        .route("/orders", post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/files", post(orders::attach_files))
        // ─── Tutor desk ───────────────────────────────────
        .route("/tutor/assignments", get(tutor::list_assignments))
        .route("/tutor/accept-assignment", post(tutor::accept_assignment))
        .route(
            "/tutor/update-assignment-status",
            post(tutor::update_assignment_status),
        )
        .route(
            "/tutor/upload-completed-files/:id",
            post(tutor::upload_completed_files),
        )
        .route("/tutor/pending-payments", get(tutor::pending_payments))
        .route("/tutor/approve-transaction", post(tutor::approve_transaction))
        .route("/tutor/reject-transaction", post(tutor::reject_transaction))
        // ─── Payments ─────────────────────────────────────
        .route("/payments/instant", post(payments::instant))
        .route("/payments/proof", post(payments::proof))
        .route("/payments/request-withdraw", post(payments::request_withdraw))
        .route("/payments/request-refund", post(payments::request_refund))
        // ─── Chat ─────────────────────────────────────────
        .route(
            "/messages",
            get(messages::history).post(messages::send_message),
        )
        .route("/messages/stream", get(chat::sse::stream))
        .route("/ws", get(chat::ws::upgrade))
        // ─── Blobs ────────────────────────────────────────
        .route("/file/:id", get(files::download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Shared shapes and helpers
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Unwrap a JSON body, reporting malformed input in the service's error shape.
pub(crate) fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServiceError::invalid(rejection.body_text()))
}
