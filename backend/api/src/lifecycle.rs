//! Assignment lifecycle service.
//!
//! Loads state, asks [`tutordesk_core::lifecycle`] what to do and persists
//! the answer with guarded status writes. Completion shares one store
//! transaction with the ledger's completion charge.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use tutordesk_core::lifecycle::{self as rules, StatusChange};
use tutordesk_core::{
    Assignment, AssignmentStatus, DomainError, FileKind, FileRef, OrderType, Transaction, User,
};
use uuid::Uuid;

use crate::blob::{self, BlobStore, IncomingFile};
use crate::db::{assignments, users};
use crate::errors::{Result, ServiceError};
use crate::ledger::{self, retrying};
use crate::notify::{self, Notification, Notifier};

// ─────────────────────────────────────────────────────────
// Inputs and outcomes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub owner_id: Uuid,
    pub order_type: OrderType,
    pub subject: String,
    pub title: String,
    pub description: String,
    pub additional_requirements: String,
    pub deadline: DateTime<Utc>,
    pub pages: u32,
    pub price_per_page: Decimal,
    pub total_cost: Decimal,
    pub files: Vec<IncomingFile>,
}

impl NewAssignment {
    fn validate(&mut self) -> Result<()> {
        self.subject = self.subject.trim().to_string();
        self.description = self.description.trim().to_string();
        self.title = self.title.trim().to_string();
        if self.subject.is_empty() {
            return Err(ServiceError::invalid("subject is required"));
        }
        if self.description.is_empty() {
            return Err(ServiceError::invalid("description is required"));
        }
        if self.title.is_empty() {
            self.title = format!("{} - {}", self.order_type, self.subject);
        }
        if self.price_per_page < Decimal::ZERO || self.total_cost < Decimal::ZERO {
            return Err(ServiceError::invalid("prices cannot be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub assignment: Assignment,
    pub charge: Transaction,
    pub balance: Decimal,
}

/// What a tutor action aims for.
#[derive(Debug, Clone, Copy)]
enum Target {
    Assign,
    Status(AssignmentStatus),
}

fn file_refs(
    stored: Vec<(blob::BlobId, String)>,
    kind: FileKind,
    uploaded_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> Vec<FileRef> {
    stored
        .into_iter()
        .map(|(blob_id, filename)| FileRef {
            blob_id,
            filename,
            kind,
            uploaded_by,
            uploaded_at: now,
        })
        .collect()
}

/// An assignment as listed on the tutor desk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAssignment {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub owner_name: String,
    pub owner_email: String,
}

// ─────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Lifecycle {
    pool: SqlitePool,
    blobs: Option<Arc<dyn BlobStore>>,
    notifier: Arc<dyn Notifier>,
}

impl Lifecycle {
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

    fn store(&self) -> Result<&dyn BlobStore> {
        self.blobs.as_deref().ok_or(ServiceError::StorageUnavailable)
    }

    /// Submit a new assignment. Starts `under-review` for technical work and
    /// `checking-balance` for everything else.
    pub async fn create(&self, mut input: NewAssignment) -> Result<Assignment> {
        input.validate()?;

        let mut conn = self.pool.acquire().await?;
        if users::get_user(&mut conn, input.owner_id).await?.is_none() {
            return Err(ServiceError::not_found("user"));
        }
        drop(conn);

        let now = Utc::now();
        let files = if input.files.is_empty() {
            Vec::new()
        } else {
            let stored = blob::store_all(self.store()?, &input.files, Some(input.owner_id)).await?;
            file_refs(stored, FileKind::Brief, Some(input.owner_id), now)
        };

        let category = input.order_type.category();
        let assignment = Assignment {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            order_type: input.order_type,
            category,
            subject: input.subject,
            title: input.title,
            description: input.description,
            additional_requirements: input.additional_requirements,
            deadline: input.deadline,
            pages: input.pages,
            price_per_page: input.price_per_page,
            total_cost: input.total_cost,
            status: rules::initial_status(category),
            assigned_tutor: None,
            tutor_comments: String::new(),
            files,
            completed_files: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut db_tx = self.pool.begin().await?;
        assignments::insert_assignment(&mut db_tx, &assignment).await?;
        db_tx.commit().await?;

        info!(
            assignment = %assignment.id,
            owner = %assignment.owner_id,
            order_type = %assignment.order_type,
            status = %assignment.status,
            total_cost = %assignment.total_cost,
            "Assignment created"
        );
        notify::dispatch(
            &self.notifier,
            Notification::AssignmentReceived {
                assignment_id: assignment.id,
                owner_id: assignment.owner_id,
                title: assignment.title.clone(),
                total_cost: assignment.total_cost,
            },
        );
        Ok(assignment)
    }

    /// Append brief files to an open assignment.
    pub async fn attach_files(
        &self,
        id: Uuid,
        uploaded_by: Option<Uuid>,
        files: Vec<IncomingFile>,
    ) -> Result<Assignment> {
        if files.is_empty() {
            return Err(ServiceError::invalid("at least one file is required"));
        }
        let current = self.get(id).await?;
        if current.status.is_terminal() {
            return Err(ServiceError::invalid(format!(
                "assignment is {} and no longer accepts files",
                current.status
            )));
        }

        let stored = blob::store_all(self.store()?, &files, uploaded_by).await?;
        let refs = file_refs(stored, FileKind::Brief, uploaded_by, Utc::now());
        let mut conn = self.pool.acquire().await?;
        assignments::insert_files(&mut conn, id, &refs).await?;
        info!(assignment = %id, count = refs.len(), "Brief files attached");
        drop(conn);
        self.get(id).await
    }

    /// Tutor accept/assign. Balance gated: an uncovered cost parks the
    /// assignment in `checking-balance` and fails with `InsufficientBalance`.
    pub async fn assign(&self, id: Uuid, tutor: Option<Uuid>) -> Result<Assignment> {
        retrying("assign", move || self.try_apply(id, Target::Assign, tutor, None)).await
    }

    /// Generic status update. `assigned` and `checking-balance` go through
    /// the balance gate; other targets follow the transition table, which
    /// never allows `completed`.
    pub async fn update_status(
        &self,
        id: Uuid,
        target: AssignmentStatus,
        tutor: Option<Uuid>,
        comments: Option<&str>,
    ) -> Result<Assignment> {
        let comments = comments.map(str::trim).filter(|c| !c.is_empty());
        retrying("update_status", move || {
            self.try_apply(id, Target::Status(target), tutor, comments)
        })
        .await
    }

    async fn try_apply(
        &self,
        id: Uuid,
        target: Target,
        tutor: Option<Uuid>,
        comments: Option<&str>,
    ) -> Result<Option<Assignment>> {
        let mut conn = self.pool.acquire().await?;
        let current = assignments::get_assignment(&mut conn, id)
            .await?
            .ok_or(ServiceError::not_found("assignment"))?;
        let owner = users::get_user(&mut conn, current.owner_id)
            .await?
            .ok_or(ServiceError::not_found("user"))?;
        if let Some(tutor) = tutor {
            if users::get_user(&mut conn, tutor).await?.is_none() {
                return Err(ServiceError::not_found("tutor"));
            }
        }

        let change = match target {
            Target::Assign => rules::plan_assign(&current, tutor, owner.balance)?,
            Target::Status(status) => rules::plan_update(&current, status, tutor, owner.balance)?,
        };
        let (status, tutor) = match change {
            StatusChange::Set(status) => (status, None),
            StatusChange::Assign { tutor } => (AssignmentStatus::Assigned, tutor),
            StatusChange::Park { .. } => (AssignmentStatus::CheckingBalance, None),
        };

        let written = assignments::update_status(
            &mut conn,
            id,
            current.status,
            status,
            tutor,
            comments,
            Utc::now(),
        )
        .await?;
        if !written {
            return Ok(None);
        }

        if let StatusChange::Park { balance, required } = change {
            info!(assignment = %id, %balance, %required, "Balance short, assignment parked");
            return Err(DomainError::InsufficientBalance { balance, required }.into());
        }

        info!(assignment = %id, from = %current.status, to = %status, "Assignment status updated");
        let updated = assignments::get_assignment(&mut conn, id)
            .await?
            .ok_or(ServiceError::not_found("assignment"))?;
        Ok(Some(updated))
    }

    /// Store the deliverables, then complete the assignment and charge its
    /// owner in a single store transaction.
    pub async fn complete_with_files(
        &self,
        id: Uuid,
        files: Vec<IncomingFile>,
        tutor: Option<Uuid>,
        comments: Option<&str>,
    ) -> Result<Completion> {
        if files.is_empty() {
            return Err(ServiceError::invalid("at least one file is required"));
        }
        let current = self.get(id).await?;
        rules::check_completion(&current)?;

        let stored = blob::store_all(self.store()?, &files, tutor).await?;
        let refs = file_refs(stored, FileKind::Completed, tutor, Utc::now());
        let comments = comments.map(str::trim).filter(|c| !c.is_empty());

        let refs = &refs;
        let (charge, balance) = retrying("complete", move || {
            self.try_complete(id, refs, comments)
        })
        .await?;

        let assignment = self.get(id).await?;
        info!(
            assignment = %id,
            files = refs.len(),
            charged = %charge.amount,
            %balance,
            "Assignment completed"
        );
        notify::dispatch(
            &self.notifier,
            Notification::AssignmentCompleted {
                assignment_id: id,
                owner_id: assignment.owner_id,
                file_count: refs.len(),
            },
        );
        Ok(Completion {
            assignment,
            charge,
            balance,
        })
    }

    async fn try_complete(
        &self,
        id: Uuid,
        refs: &[FileRef],
        comments: Option<&str>,
    ) -> Result<Option<(Transaction, Decimal)>> {
        let current = self.get(id).await?;
        rules::check_completion(&current)?;

        let now = Utc::now();
        let mut db_tx = self.pool.begin().await?;
        if !assignments::mark_completed(&mut db_tx, id, current.status, comments, now).await? {
            return Ok(None);
        }
        assignments::insert_files(&mut db_tx, id, refs).await?;
        let Some(charged) = ledger::charge_for_completion(&mut db_tx, &current, now).await? else {
            warn!(assignment = %id, "Owner balance moved during completion");
            return Ok(None);
        };
        db_tx.commit().await?;
        Ok(Some(charged))
    }

    // ─── Queries ──────────────────────────────────────────

    pub async fn get(&self, id: Uuid) -> Result<Assignment> {
        let mut conn = self.pool.acquire().await?;
        assignments::get_assignment(&mut conn, id)
            .await?
            .ok_or(ServiceError::not_found("assignment"))
    }

    /// All assignments of a user, newest first.
    pub async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Assignment>> {
        let mut conn = self.pool.acquire().await?;
        if users::get_user(&mut conn, owner).await?.is_none() {
            return Err(ServiceError::not_found("user"));
        }
        assignments::list_for_owner(&mut conn, owner).await
    }

    /// The tutor work queue: every assignment, newest first, with its
    /// owner's contact details.
    pub async fn list_all(&self, status: Option<AssignmentStatus>) -> Result<Vec<QueuedAssignment>> {
        let mut conn = self.pool.acquire().await?;
        let found = assignments::list_all(&mut conn, status).await?;

        let mut owners: HashMap<Uuid, User> = HashMap::new();
        let mut queue = Vec::with_capacity(found.len());
        for assignment in found {
            if !owners.contains_key(&assignment.owner_id) {
                let owner = users::get_user(&mut conn, assignment.owner_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::Corrupt(format!(
                            "assignment {} has no owner {}",
                            assignment.id, assignment.owner_id
                        ))
                    })?;
                owners.insert(owner.id, owner);
            }
            let owner = &owners[&assignment.owner_id];
            queue.push(QueuedAssignment {
                owner_name: owner.name.clone(),
                owner_email: owner.email.clone(),
                assignment,
            });
        }
        Ok(queue)
    }
}
