//! # Chat authorization
//!
//! Decides who may post into an assignment's chat and which participant ids
//! get stored with the message. Client-supplied ids are never stored as-is.

use uuid::Uuid;

use crate::errors::{DomainError, Result};
use crate::types::{Assignment, Sender};

/// Content longer than this is cut, not refused.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Participant ids to persist with an accepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participants {
    pub student_id: Uuid,
    pub tutor_id: Option<Uuid>,
}

/// Check the sender against the assignment and normalize participant ids.
///
/// * students must be the owner;
/// * tutors must match the assigned tutor once there is one, and are free to
///   post (with or without an id) before that.
pub fn authorize(
    assignment: &Assignment,
    sender: Sender,
    student_id: Option<Uuid>,
    tutor_id: Option<Uuid>,
) -> Result<Participants> {
    match sender {
        Sender::Student => {
            let claimed =
                student_id.ok_or_else(|| DomainError::invalid("studentId is required"))?;
            if claimed != assignment.owner_id {
                return Err(DomainError::forbidden("not your assignment"));
            }
        }
        Sender::Tutor => {
            if let (Some(assigned), Some(claimed)) = (assignment.assigned_tutor, tutor_id) {
                if assigned != claimed {
                    return Err(DomainError::forbidden(
                        "tutor not assigned to this assignment",
                    ));
                }
            }
        }
    }

    Ok(Participants {
        student_id: assignment.owner_id,
        tutor_id: assignment.assigned_tutor,
    })
}

/// Reject empty content and cut to [`MAX_MESSAGE_CHARS`] characters.
///
/// Whitespace is kept as sent. The limit counts Unicode scalar values, so a
/// message of astral-plane characters keeps more of them than a UTF-16
/// based limit would.
pub fn normalize_content(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(DomainError::invalid("content is required"));
    }
    Ok(raw.chars().take(MAX_MESSAGE_CHARS).collect())
}
