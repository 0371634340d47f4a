//! `users` table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tutordesk_core::User;
use uuid::Uuid;

use super::{parse_decimal, parse_enum, parse_uuid};
use crate::errors::Result;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    role: String,
    balance: String,
    version: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = crate::errors::ServiceError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid("users.id", &row.id)?,
            name: row.name,
            email: row.email,
            role: parse_enum("users.role", &row.role)?,
            balance: parse_decimal("users.balance", &row.balance)?,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_user(conn: &mut SqliteConnection, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, role, balance, version, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.name)
    .bind(&user.email)
    .bind(user.role.as_str())
    .bind(user.balance.to_string())
    .bind(user.version)
    .bind(user.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_user(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, name, email, role, balance, version, created_at
        FROM   users
        WHERE  id = ?1
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    row.map(User::try_from).transpose()
}

pub async fn email_taken(conn: &mut SqliteConnection, email: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE email = ?1")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Write `balance` if the row is still at `expected_version`.
///
/// Returns `false` when another writer got there first.
pub async fn swap_balance(
    conn: &mut SqliteConnection,
    id: Uuid,
    balance: Decimal,
    expected_version: i64,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE users
        SET    balance = ?1, version = version + 1
        WHERE  id = ?2 AND version = ?3
        "#,
    )
    .bind(balance.to_string())
    .bind(id.to_string())
    .bind(expected_version)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}
