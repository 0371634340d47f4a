//! `messages` table. Append-only.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tutordesk_core::Message;
use uuid::Uuid;

use super::{parse_enum, parse_opt_uuid, parse_uuid};
use crate::errors::{Result, ServiceError};

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    assignment_id: String,
    student_id: String,
    tutor_id: Option<String>,
    sender: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = ServiceError;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_uuid("messages.id", &row.id)?,
            assignment_id: parse_uuid("messages.assignment_id", &row.assignment_id)?,
            student_id: parse_uuid("messages.student_id", &row.student_id)?,
            tutor_id: parse_opt_uuid("messages.tutor_id", row.tutor_id.as_deref())?,
            sender: parse_enum("messages.sender", &row.sender)?,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_message(conn: &mut SqliteConnection, msg: &Message) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messages
            (id, assignment_id, student_id, tutor_id, sender, content, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(msg.id.to_string())
    .bind(msg.assignment_id.to_string())
    .bind(msg.student_id.to_string())
    .bind(msg.tutor_id.map(|t| t.to_string()))
    .bind(msg.sender.as_str())
    .bind(&msg.content)
    .bind(msg.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Full history of one assignment's chat, oldest first.
pub async fn list_for_assignment(
    conn: &mut SqliteConnection,
    assignment_id: Uuid,
) -> Result<Vec<Message>> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT id, assignment_id, student_id, tutor_id, sender, content, created_at
        FROM   messages
        WHERE  assignment_id = ?1
        ORDER  BY created_at ASC, seq ASC
        "#,
    )
    .bind(assignment_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Message::try_from).collect()
}
