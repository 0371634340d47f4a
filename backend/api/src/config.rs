//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Directory backing the blob store
    pub blob_dir: PathBuf,
    /// Largest accepted multipart body, in bytes
    pub max_upload_bytes: usize,
    /// Idle interval before an SSE keep-alive comment is sent
    pub sse_keepalive_secs: u64,
    /// WebSocket ping interval
    pub ws_ping_secs: u64,
    /// Optional endpoint receiving notification events as JSON
    pub notify_webhook_url: Option<String>,
    /// Optional inbox copied on new assignments
    pub tutor_notify_email: Option<String>,
    /// Optional inbox copied on payment events
    pub billing_notify_email: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./tutordesk.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid API_PORT".to_string()))?,
            blob_dir: env_var("BLOB_DIR")
                .unwrap_or_else(|_| "./uploads".to_string())
                .into(),
            max_upload_bytes: env_var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid MAX_UPLOAD_BYTES".to_string()))?,
            sse_keepalive_secs: env_var("SSE_KEEPALIVE_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid SSE_KEEPALIVE_SECS".to_string()))?,
            ws_ping_secs: env_var("WS_PING_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid WS_PING_SECS".to_string()))?,
            notify_webhook_url: env_var("NOTIFY_WEBHOOK_URL").ok(),
            tutor_notify_email: env_var("TUTOR_NOTIFY_EMAIL").ok(),
            billing_notify_email: env_var("BILLING_NOTIFY_EMAIL").ok(),
        })
    }

    pub fn sse_keepalive(&self) -> Duration {
        Duration::from_secs(self.sse_keepalive_secs)
    }

    pub fn ws_ping(&self) -> Duration {
        Duration::from_secs(self.ws_ping_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite:./tutordesk.db".to_string(),
            api_port: 3002,
            blob_dir: "./uploads".into(),
            max_upload_bytes: 10 * 1024 * 1024,
            sse_keepalive_secs: 15,
            ws_ping_secs: 30,
            notify_webhook_url: None,
            tutor_notify_email: None,
            billing_notify_email: None,
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ServiceError::Config(format!("Missing env var: {key}")))
}
