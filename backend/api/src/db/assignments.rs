//! `assignments` and `assignment_files` tables.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tutordesk_core::{Assignment, AssignmentStatus, FileKind, FileRef};
use uuid::Uuid;

use super::{parse_decimal, parse_enum, parse_opt_uuid, parse_uuid};
use crate::errors::{Result, ServiceError};

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: String,
    owner_id: String,
    order_type: String,
    category: String,
    subject: String,
    title: String,
    description: String,
    additional_requirements: String,
    deadline: DateTime<Utc>,
    pages: i64,
    price_per_page: String,
    total_cost: String,
    status: String,
    assigned_tutor: Option<String>,
    tutor_comments: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct FileRow {
    kind: String,
    blob_id: String,
    filename: String,
    uploaded_by: Option<String>,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<FileRow> for FileRef {
    type Error = ServiceError;

    fn try_from(row: FileRow) -> Result<Self> {
        Ok(FileRef {
            blob_id: row.blob_id,
            filename: row.filename,
            kind: parse_enum("assignment_files.kind", &row.kind)?,
            uploaded_by: parse_opt_uuid("assignment_files.uploaded_by", row.uploaded_by.as_deref())?,
            uploaded_at: row.uploaded_at,
        })
    }
}

impl AssignmentRow {
    fn into_assignment(self, files: Vec<FileRef>) -> Result<Assignment> {
        let (completed_files, files): (Vec<FileRef>, Vec<FileRef>) = files
            .into_iter()
            .partition(|f| f.kind == FileKind::Completed);
        Ok(Assignment {
            id: parse_uuid("assignments.id", &self.id)?,
            owner_id: parse_uuid("assignments.owner_id", &self.owner_id)?,
            order_type: parse_enum("assignments.order_type", &self.order_type)?,
            category: parse_enum("assignments.category", &self.category)?,
            subject: self.subject,
            title: self.title,
            description: self.description,
            additional_requirements: self.additional_requirements,
            deadline: self.deadline,
            pages: u32::try_from(self.pages)
                .map_err(|e| ServiceError::Corrupt(format!("assignments.pages: {e}")))?,
            price_per_page: parse_decimal("assignments.price_per_page", &self.price_per_page)?,
            total_cost: parse_decimal("assignments.total_cost", &self.total_cost)?,
            status: parse_enum("assignments.status", &self.status)?,
            assigned_tutor: parse_opt_uuid(
                "assignments.assigned_tutor",
                self.assigned_tutor.as_deref(),
            )?,
            tutor_comments: self.tutor_comments,
            files,
            completed_files,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

const SELECT_ASSIGNMENT: &str = r#"
    SELECT id, owner_id, order_type, category, subject, title, description,
           additional_requirements, deadline, pages, price_per_page, total_cost,
           status, assigned_tutor, tutor_comments, created_at, updated_at,
           completed_at
    FROM   assignments
"#;

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

pub async fn insert_assignment(conn: &mut SqliteConnection, a: &Assignment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO assignments
            (id, owner_id, order_type, category, subject, title, description,
             additional_requirements, deadline, pages, price_per_page, total_cost,
             status, assigned_tutor, tutor_comments, created_at, updated_at,
             completed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18)
        "#,
    )
    .bind(a.id.to_string())
    .bind(a.owner_id.to_string())
    .bind(a.order_type.as_str())
    .bind(a.category.as_str())
    .bind(&a.subject)
    .bind(&a.title)
    .bind(&a.description)
    .bind(&a.additional_requirements)
    .bind(a.deadline)
    .bind(i64::from(a.pages))
    .bind(a.price_per_page.to_string())
    .bind(a.total_cost.to_string())
    .bind(a.status.as_str())
    .bind(a.assigned_tutor.map(|t| t.to_string()))
    .bind(&a.tutor_comments)
    .bind(a.created_at)
    .bind(a.updated_at)
    .bind(a.completed_at)
    .execute(&mut *conn)
    .await?;

    insert_files(conn, a.id, &a.files).await?;
    insert_files(conn, a.id, &a.completed_files).await?;
    Ok(())
}

pub async fn insert_files(
    conn: &mut SqliteConnection,
    assignment_id: Uuid,
    files: &[FileRef],
) -> Result<()> {
    for f in files {
        sqlx::query(
            r#"
            INSERT INTO assignment_files
                (assignment_id, kind, blob_id, filename, uploaded_by, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(assignment_id.to_string())
        .bind(f.kind.as_str())
        .bind(&f.blob_id)
        .bind(&f.filename)
        .bind(f.uploaded_by.map(|u| u.to_string()))
        .bind(f.uploaded_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Guarded status write. `tutor` only overwrites when present; `comments`
/// only when present.
///
/// Returns `false` if the assignment left `expected` in the meantime.
pub async fn update_status(
    conn: &mut SqliteConnection,
    id: Uuid,
    expected: AssignmentStatus,
    status: AssignmentStatus,
    tutor: Option<Uuid>,
    comments: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE assignments
        SET    status = ?1,
               assigned_tutor = COALESCE(?2, assigned_tutor),
               tutor_comments = COALESCE(?3, tutor_comments),
               updated_at = ?4
        WHERE  id = ?5 AND status = ?6
        "#,
    )
    .bind(status.as_str())
    .bind(tutor.map(|t| t.to_string()))
    .bind(comments)
    .bind(now)
    .bind(id.to_string())
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

/// Guarded move to `completed`.
pub async fn mark_completed(
    conn: &mut SqliteConnection,
    id: Uuid,
    expected: AssignmentStatus,
    comments: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE assignments
        SET    status = ?1,
               tutor_comments = COALESCE(?2, tutor_comments),
               completed_at = ?3,
               updated_at = ?3
        WHERE  id = ?4 AND status = ?5
        "#,
    )
    .bind(AssignmentStatus::Completed.as_str())
    .bind(comments)
    .bind(now)
    .bind(id.to_string())
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

async fn files_for(conn: &mut SqliteConnection, assignment_id: &str) -> Result<Vec<FileRef>> {
    let rows = sqlx::query_as::<_, FileRow>(
        r#"
        SELECT kind, blob_id, filename, uploaded_by, uploaded_at
        FROM   assignment_files
        WHERE  assignment_id = ?1
        ORDER  BY seq ASC
        "#,
    )
    .bind(assignment_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(FileRef::try_from).collect()
}

async fn hydrate(conn: &mut SqliteConnection, rows: Vec<AssignmentRow>) -> Result<Vec<Assignment>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let files = files_for(conn, &row.id).await?;
        out.push(row.into_assignment(files)?);
    }
    Ok(out)
}

pub async fn get_assignment(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Assignment>> {
    let row = sqlx::query_as::<_, AssignmentRow>(&format!("{SELECT_ASSIGNMENT} WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// All assignments of `owner_id`, newest first.
pub async fn list_for_owner(conn: &mut SqliteConnection, owner_id: Uuid) -> Result<Vec<Assignment>> {
    let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
        "{SELECT_ASSIGNMENT} WHERE owner_id = ?1 ORDER BY created_at DESC"
    ))
    .bind(owner_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    hydrate(conn, rows).await
}

/// Assignments of `owner_id` in `status`, oldest first.
pub async fn list_for_owner_in(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    status: AssignmentStatus,
) -> Result<Vec<Assignment>> {
    let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
        "{SELECT_ASSIGNMENT} WHERE owner_id = ?1 AND status = ?2 ORDER BY created_at ASC"
    ))
    .bind(owner_id.to_string())
    .bind(status.as_str())
    .fetch_all(&mut *conn)
    .await?;
    hydrate(conn, rows).await
}

/// Every assignment, newest first, optionally only those in `status`.
pub async fn list_all(
    conn: &mut SqliteConnection,
    status: Option<AssignmentStatus>,
) -> Result<Vec<Assignment>> {
    let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
        "{SELECT_ASSIGNMENT} WHERE ?1 IS NULL OR status = ?1 ORDER BY created_at DESC, rowid DESC"
    ))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(&mut *conn)
    .await?;
    hydrate(conn, rows).await
}
