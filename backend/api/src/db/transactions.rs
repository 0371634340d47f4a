//! `transactions` table: the ledger.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tutordesk_core::{Transaction, TransactionStatus};
use uuid::Uuid;

use super::{parse_decimal, parse_enum, parse_opt_uuid, parse_uuid};
use crate::errors::{Result, ServiceError};

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    owner_id: String,
    assignment_id: Option<String>,
    amount: String,
    method: String,
    status: String,
    reference: String,
    proof_blob_id: Option<String>,
    proof_filename: Option<String>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = ServiceError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: parse_uuid("transactions.id", &row.id)?,
            owner_id: parse_uuid("transactions.owner_id", &row.owner_id)?,
            assignment_id: parse_opt_uuid(
                "transactions.assignment_id",
                row.assignment_id.as_deref(),
            )?,
            amount: parse_decimal("transactions.amount", &row.amount)?,
            method: parse_enum("transactions.method", &row.method)?,
            status: parse_enum("transactions.status", &row.status)?,
            reference: row.reference,
            proof_blob_id: row.proof_blob_id,
            proof_filename: row.proof_filename,
            approved_by: parse_opt_uuid("transactions.approved_by", row.approved_by.as_deref())?,
            approved_at: row.approved_at,
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_TRANSACTION: &str = r#"
    SELECT id, owner_id, assignment_id, amount, method, status, reference,
           proof_blob_id, proof_filename, approved_by, approved_at,
           rejection_reason, created_at, updated_at
    FROM   transactions
"#;

pub async fn insert_transaction(conn: &mut SqliteConnection, tx: &Transaction) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions
            (id, owner_id, assignment_id, amount, method, status, reference,
             proof_blob_id, proof_filename, approved_by, approved_at,
             rejection_reason, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(tx.id.to_string())
    .bind(tx.owner_id.to_string())
    .bind(tx.assignment_id.map(|a| a.to_string()))
    .bind(tx.amount.to_string())
    .bind(tx.method.as_str())
    .bind(tx.status.as_str())
    .bind(&tx.reference)
    .bind(&tx.proof_blob_id)
    .bind(&tx.proof_filename)
    .bind(tx.approved_by.map(|a| a.to_string()))
    .bind(tx.approved_at)
    .bind(&tx.rejection_reason)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_transaction(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!("{SELECT_TRANSACTION} WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Transaction::try_from).transpose()
}

/// Close an open transaction if it is still in `expected`.
///
/// Returns `false` when someone else resolved it first.
pub async fn resolve(
    conn: &mut SqliteConnection,
    id: Uuid,
    expected: TransactionStatus,
    status: TransactionStatus,
    approver: Option<Uuid>,
    rejection_reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE transactions
        SET    status = ?1,
               approved_by = ?2,
               approved_at = ?3,
               rejection_reason = ?4,
               updated_at = ?3
        WHERE  id = ?5 AND status = ?6
        "#,
    )
    .bind(status.as_str())
    .bind(approver.map(|a| a.to_string()))
    .bind(now)
    .bind(rejection_reason)
    .bind(id.to_string())
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

/// Ledger history of one user, newest first.
pub async fn list_for_owner(conn: &mut SqliteConnection, owner_id: Uuid) -> Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "{SELECT_TRANSACTION} WHERE owner_id = ?1 ORDER BY created_at DESC"
    ))
    .bind(owner_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Transaction::try_from).collect()
}

/// Every transaction still waiting for an approver, oldest first.
pub async fn list_open(conn: &mut SqliteConnection) -> Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "{SELECT_TRANSACTION} WHERE status IN (?1, ?2, ?3) ORDER BY created_at ASC"
    ))
    .bind(TransactionStatus::Pending.as_str())
    .bind(TransactionStatus::WithdrawRequested.as_str())
    .bind(TransactionStatus::RefundRequested.as_str())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Transaction::try_from).collect()
}
