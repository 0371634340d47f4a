//! Database layer: migrations, row mapping and queries.
//!
//! Every query helper takes `&mut SqliteConnection` so the same function
//! works on a pooled connection and inside a transaction (`&mut tx`).
//!
//! Money is stored as decimal text and compared in Rust, so balance writes are
//! compare-and-swap on `users.version` rather than SQL arithmetic. Status
//! writes carry a `WHERE status = <expected>` guard for the same reason.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::errors::{Result, ServiceError};

pub mod assignments;
pub mod messages;
pub mod transactions;
pub mod users;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Column decoding helpers
// ─────────────────────────────────────────────────────────

pub(crate) fn parse_uuid(column: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ServiceError::Corrupt(format!("{column}: {e}")))
}

pub(crate) fn parse_opt_uuid(column: &str, raw: Option<&str>) -> Result<Option<Uuid>> {
    raw.map(|v| parse_uuid(column, v)).transpose()
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| ServiceError::Corrupt(format!("{column}: {e}")))
}

pub(crate) fn parse_enum<T>(column: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| ServiceError::Corrupt(format!("{column}: {e}")))
}

/// SQLite lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED` and their extended
/// codes). Worth retrying.
pub(crate) fn is_busy(err: &ServiceError) -> bool {
    match err {
        ServiceError::Database(sqlx::Error::Database(db_err)) => db_err
            .code()
            .and_then(|c| c.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}
