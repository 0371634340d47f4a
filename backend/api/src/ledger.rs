//! Ledger service: credits, approvals, withdrawals, refunds and the
//! completion charge.
//!
//! Every balance write happens inside a store transaction whose first
//! statement is a write (a transaction insert or a guarded status flip), so
//! SQLite takes the write lock up front. The balance itself is then swapped
//! against `users.version`; a lost swap or a busy store retries the whole
//! attempt a bounded number of times.
//!
//! Balance arithmetic is delegated to [`tutordesk_core::ledger`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use tutordesk_core::{
    ledger, lifecycle, Assignment, AssignmentStatus, DomainError, PaymentMethod, Transaction,
    TransactionStatus,
};
use uuid::Uuid;

use crate::blob::{BlobStore, IncomingFile};
use crate::db::{self, assignments, transactions, users};
use crate::errors::{Result, ServiceError};
use crate::notify::{self, Notification, Notifier};

/// Attempts made before an operation gives up with [`ServiceError::Conflict`].
pub const MAX_ATTEMPTS: u32 = 5;

/// Run `attempt` until it produces a value. `Ok(None)` means an optimistic
/// check lost a race.
pub(crate) async fn retrying<T, F, Fut>(op: &'static str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for n in 1..=MAX_ATTEMPTS {
        match attempt().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => debug!(op, attempt = n, "Lost optimistic race, retrying"),
            Err(e) if db::is_busy(&e) => debug!(op, attempt = n, error = %e, "Store busy, retrying"),
            Err(e) => return Err(e),
        }
        tokio::time::sleep(Duration::from_millis(5 * u64::from(n))).await;
    }
    warn!(op, attempts = MAX_ATTEMPTS, "Giving up after repeated conflicts");
    Err(ServiceError::Conflict(MAX_ATTEMPTS))
}

// ─────────────────────────────────────────────────────────
// Inputs and outcomes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CreditRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub proof: Option<IncomingFile>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditOutcome {
    pub transaction: Transaction,
    /// Present when the credit was applied immediately.
    pub balance: Option<Decimal>,
    pub advanced: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub transaction: Transaction,
    pub balance: Decimal,
    pub advanced: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheck {
    pub balance: Decimal,
    pub total_required: Decimal,
    pub needs_top_up: bool,
    pub checking_balance_orders: usize,
}

fn default_reference(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", prefix.to_uppercase(), now.timestamp_millis())
}

fn new_transaction(
    owner_id: Uuid,
    assignment_id: Option<Uuid>,
    amount: Decimal,
    method: PaymentMethod,
    status: TransactionStatus,
    reference: String,
    now: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        owner_id,
        assignment_id,
        amount,
        method,
        status,
        reference,
        proof_blob_id: None,
        proof_filename: None,
        approved_by: None,
        approved_at: None,
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    }
}

/// Insert `tx` and apply `delta` to its owner inside `conn`'s transaction.
///
/// Returns the new balance, or `None` when the version swap lost.
async fn insert_applied(
    conn: &mut SqliteConnection,
    tx: &Transaction,
    delta: Decimal,
) -> Result<Option<Decimal>> {
    transactions::insert_transaction(conn, tx).await?;
    let user = users::get_user(conn, tx.owner_id)
        .await?
        .ok_or(ServiceError::not_found("user"))?;
    let balance = user.balance + delta;
    if !users::swap_balance(conn, user.id, balance, user.version).await? {
        return Ok(None);
    }
    Ok(Some(balance))
}

/// Record the completion charge for `assignment` inside the caller's store
/// transaction. The debit is unconditional.
pub(crate) async fn charge_for_completion(
    conn: &mut SqliteConnection,
    assignment: &Assignment,
    now: DateTime<Utc>,
) -> Result<Option<(Transaction, Decimal)>> {
    let tx = new_transaction(
        assignment.owner_id,
        Some(assignment.id),
        ledger::completion_charge(assignment.total_cost),
        PaymentMethod::AssignmentCharge,
        TransactionStatus::Completed,
        format!("CHARGE-{}", assignment.id),
        now,
    );
    let Some(balance) = insert_applied(conn, &tx, tx.amount).await? else {
        return Ok(None);
    };
    if balance < Decimal::ZERO {
        warn!(
            assignment = %assignment.id,
            owner = %assignment.owner_id,
            %balance,
            "Completion charge left a negative balance"
        );
    }
    Ok(Some((tx, balance)))
}

// ─────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
    blobs: Option<Arc<dyn BlobStore>>,
    notifier: Arc<dyn Notifier>,
}

impl Ledger {
    pub fn new(
        pool: SqlitePool,
        blobs: Option<Arc<dyn BlobStore>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            pool,
            blobs,
            notifier,
        }
    }

    /// Credit a user, immediately for instant methods or pending approval
    /// for proof-based ones.
    pub async fn record_credit(&self, req: CreditRequest) -> Result<CreditOutcome> {
        let amount = ledger::require_positive(req.amount)?;
        let status = ledger::credit_status(req.method)?;

        let mut conn = self.pool.acquire().await?;
        if users::get_user(&mut conn, req.user_id).await?.is_none() {
            return Err(ServiceError::not_found("user"));
        }
        drop(conn);

        let now = Utc::now();
        let reference = req
            .reference
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| default_reference(req.method.as_str(), now));
        let mut tx = new_transaction(req.user_id, None, amount, req.method, status, reference, now);

        if req.method.requires_proof() {
            let proof = req
                .proof
                .ok_or_else(|| ServiceError::invalid("a proof of payment file is required"))?;
            let store = self.blobs.as_ref().ok_or(ServiceError::StorageUnavailable)?;
            let blob_id = store
                .put(&proof.bytes, &proof.content_type, &proof.filename, Some(req.user_id))
                .await?;
            tx.proof_blob_id = Some(blob_id);
            tx.proof_filename = Some(proof.filename);

            let mut conn = self.pool.acquire().await?;
            transactions::insert_transaction(&mut conn, &tx).await?;
            info!(tx = %tx.id, user = %tx.owner_id, %amount, method = %tx.method, "Payment proof recorded");
            notify::dispatch(
                &self.notifier,
                Notification::PaymentProofReceived {
                    transaction_id: tx.id,
                    owner_id: tx.owner_id,
                    amount,
                    method: tx.method.to_string(),
                },
            );
            return Ok(CreditOutcome {
                transaction: tx,
                balance: None,
                advanced: Vec::new(),
            });
        }

        let pending = &tx;
        let balance = retrying("credit", move || self.try_credit(pending)).await?;
        info!(tx = %tx.id, user = %tx.owner_id, %amount, %balance, "Instant credit applied");

        let advanced = self.reevaluate(tx.owner_id).await?;
        Ok(CreditOutcome {
            transaction: tx,
            balance: Some(balance),
            advanced,
        })
    }

    async fn try_credit(&self, tx: &Transaction) -> Result<Option<Decimal>> {
        let mut db_tx = self.pool.begin().await?;
        let Some(balance) = insert_applied(&mut db_tx, tx, tx.amount).await? else {
            return Ok(None);
        };
        db_tx.commit().await?;
        Ok(Some(balance))
    }

    /// Apply an open transaction's balance effect and mark it approved.
    pub async fn approve(&self, id: Uuid, approver: Uuid) -> Result<Approval> {
        let (transaction, balance) =
            retrying("approve", move || self.try_approve(id, approver)).await?;
        info!(tx = %id, %approver, %balance, "Transaction approved");

        let advanced = self.reevaluate(transaction.owner_id).await?;
        notify::dispatch(
            &self.notifier,
            Notification::PaymentApproved {
                transaction_id: id,
                owner_id: transaction.owner_id,
                new_balance: balance,
            },
        );
        Ok(Approval {
            transaction,
            balance,
            advanced,
        })
    }

    async fn try_approve(&self, id: Uuid, approver: Uuid) -> Result<Option<(Transaction, Decimal)>> {
        let mut current = self.load_open(id).await?;

        let now = Utc::now();
        let mut db_tx = self.pool.begin().await?;
        let claimed = transactions::resolve(
            &mut db_tx,
            id,
            current.status,
            TransactionStatus::Approved,
            Some(approver),
            None,
            now,
        )
        .await?;
        if !claimed {
            return Err(DomainError::AlreadyResolved.into());
        }

        let user = users::get_user(&mut db_tx, current.owner_id)
            .await?
            .ok_or(ServiceError::not_found("user"))?;
        // An insufficient withdrawal drops `db_tx`, rolling back the claim.
        let balance = ledger::approval_effect(&current, user.balance)?;
        if !users::swap_balance(&mut db_tx, user.id, balance, user.version).await? {
            return Ok(None);
        }
        db_tx.commit().await?;

        current.status = TransactionStatus::Approved;
        current.approved_by = Some(approver);
        current.approved_at = Some(now);
        current.updated_at = now;
        Ok(Some((current, balance)))
    }

    /// Close an open transaction without touching the balance.
    pub async fn reject(&self, id: Uuid, approver: Uuid, reason: Option<&str>) -> Result<Transaction> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let transaction =
            retrying("reject", move || self.try_reject(id, approver, reason)).await?;
        info!(tx = %id, %approver, ?reason, "Transaction rejected");

        notify::dispatch(
            &self.notifier,
            Notification::PaymentRejected {
                transaction_id: id,
                owner_id: transaction.owner_id,
                reason: reason.unwrap_or_default().to_string(),
            },
        );
        Ok(transaction)
    }

    async fn try_reject(
        &self,
        id: Uuid,
        approver: Uuid,
        reason: Option<&str>,
    ) -> Result<Option<Transaction>> {
        let mut current = self.load_open(id).await?;
        let now = Utc::now();
        let mut conn = self.pool.acquire().await?;
        let claimed = transactions::resolve(
            &mut conn,
            id,
            current.status,
            TransactionStatus::Rejected,
            Some(approver),
            reason,
            now,
        )
        .await?;
        if !claimed {
            return Err(DomainError::AlreadyResolved.into());
        }
        current.status = TransactionStatus::Rejected;
        current.approved_by = Some(approver);
        current.approved_at = Some(now);
        current.rejection_reason = reason.map(str::to_string);
        current.updated_at = now;
        Ok(Some(current))
    }

    async fn load_open(&self, id: Uuid) -> Result<Transaction> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::get_transaction(&mut conn, id)
            .await?
            .ok_or(ServiceError::not_found("transaction"))?;
        ledger::check_rejectable(&tx)?;
        Ok(tx)
    }

    /// Record a withdrawal request. Nothing is held; approval checks the
    /// balance again.
    pub async fn request_withdrawal(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        destination: Option<String>,
    ) -> Result<Transaction> {
        if method == PaymentMethod::AssignmentCharge {
            return Err(ServiceError::invalid("assignment-charge cannot be requested"));
        }
        let mut conn = self.pool.acquire().await?;
        let user = users::get_user(&mut conn, user_id)
            .await?
            .ok_or(ServiceError::not_found("user"))?;
        ledger::check_withdrawal(user.balance, amount)?;

        let now = Utc::now();
        let reference = destination
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| default_reference("withdraw", now));
        let tx = new_transaction(
            user_id,
            None,
            amount,
            method,
            TransactionStatus::WithdrawRequested,
            reference,
            now,
        );
        transactions::insert_transaction(&mut conn, &tx).await?;
        info!(tx = %tx.id, user = %user_id, %amount, "Withdrawal requested");
        Ok(tx)
    }

    /// Record a refund request against one of the user's assignments.
    pub async fn request_refund(
        &self,
        user_id: Uuid,
        assignment_id: Uuid,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<Transaction> {
        let amount = ledger::require_positive(amount)?;
        let mut conn = self.pool.acquire().await?;
        if users::get_user(&mut conn, user_id).await?.is_none() {
            return Err(ServiceError::not_found("user"));
        }
        let assignment = assignments::get_assignment(&mut conn, assignment_id)
            .await?
            .ok_or(ServiceError::not_found("assignment"))?;
        if assignment.owner_id != user_id {
            return Err(DomainError::forbidden("not your assignment").into());
        }

        let now = Utc::now();
        let reference = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Refund request".to_string());
        let tx = new_transaction(
            user_id,
            Some(assignment_id),
            amount,
            PaymentMethod::Paypal,
            TransactionStatus::RefundRequested,
            reference,
            now,
        );
        transactions::insert_transaction(&mut conn, &tx).await?;
        info!(tx = %tx.id, user = %user_id, assignment = %assignment_id, %amount, "Refund requested");
        Ok(tx)
    }

    /// Advance every gated assignment of `owner` that the current balance
    /// covers. Returns the ids that moved.
    pub async fn reevaluate(&self, owner: Uuid) -> Result<Vec<Uuid>> {
        let mut conn = self.pool.acquire().await?;
        let Some(user) = users::get_user(&mut conn, owner).await? else {
            return Ok(Vec::new());
        };
        let gated =
            assignments::list_for_owner_in(&mut conn, owner, AssignmentStatus::CheckingBalance)
                .await?;

        let now = Utc::now();
        let mut advanced = Vec::new();
        for id in lifecycle::advance_gated(user.balance, &gated) {
            let moved = assignments::update_status(
                &mut conn,
                id,
                AssignmentStatus::CheckingBalance,
                AssignmentStatus::Assigned,
                None,
                None,
                now,
            )
            .await?;
            if moved {
                info!(assignment = %id, owner = %owner, balance = %user.balance, "Balance covers cost, assignment advanced");
                advanced.push(id);
            }
        }
        Ok(advanced)
    }

    // ─── Queries ──────────────────────────────────────────

    pub async fn history(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        if users::get_user(&mut conn, user_id).await?.is_none() {
            return Err(ServiceError::not_found("user"));
        }
        transactions::list_for_owner(&mut conn, user_id).await
    }

    pub async fn pending(&self) -> Result<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        transactions::list_open(&mut conn).await
    }

    pub async fn balance_check(&self, user_id: Uuid) -> Result<BalanceCheck> {
        let mut conn = self.pool.acquire().await?;
        let user = users::get_user(&mut conn, user_id)
            .await?
            .ok_or(ServiceError::not_found("user"))?;
        let gated =
            assignments::list_for_owner_in(&mut conn, user_id, AssignmentStatus::CheckingBalance)
                .await?;
        let total_required: Decimal = gated.iter().map(|a| a.total_cost).sum();
        Ok(BalanceCheck {
            balance: user.balance,
            total_required,
            needs_top_up: user.balance < total_required,
            checking_balance_orders: gated.len(),
        })
    }
}
