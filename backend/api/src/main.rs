//! TutorDesk API server: entry point.
//!
//! Opens the SQLite store, the blob store and the notifier, then serves the
//! REST / SSE / WebSocket API until Ctrl-C.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tutordesk_api::api::{self, AppState};
use tutordesk_api::blob::{BlobStore, FsBlobStore};
use tutordesk_api::config::Config;
use tutordesk_api::{db, notify};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let pool = db::init_pool(&config.database_url).await?;

    // Uploads are optional: without a store the rest of the API keeps working.
    let blobs: Option<Arc<dyn BlobStore>> = match FsBlobStore::open(&config.blob_dir).await {
        Ok(store) => Some(Arc::new(store) as Arc<dyn BlobStore>),
        Err(e) => {
            warn!(error = %e, dir = %config.blob_dir.display(), "Blob store unavailable, uploads disabled");
            None
        }
    };

    let notifier = notify::from_config(&config)?;

    let shutdown = CancellationToken::new();
    let addr = format!("0.0.0.0:{}", config.api_port);
    let state = Arc::new(AppState::new(
        pool.clone(),
        config,
        blobs,
        notifier,
        shutdown.clone(),
    ));
    let app = api::router(state);

    info!("API listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown requested");
            // Ends SSE streams and WebSocket loops so the server can drain.
            signal.cancel();
        })
        .await?;

    pool.close().await;
    info!("Server stopped");
    Ok(())
}
