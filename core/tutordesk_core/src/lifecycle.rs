//! # Assignment lifecycle
//!
//! Pure transition decisions. Callers load the assignment and the owner's
//! balance, ask this module what to do, then persist the outcome.
//!
//! Two rules are special:
//!
//! * `assigned` is balance gated. Entering it with an uncovered cost parks the
//!   assignment in `checking-balance` and reports
//!   [`DomainError::InsufficientBalance`].
//! * `completed` is only reachable through [`check_completion`], which the
//!   upload flow pairs with the completion charge.
//!
//! Everything else follows [`is_allowed`].

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::{DomainError, Result};
use crate::types::{Assignment, AssignmentStatus, Category};

/// Status a freshly submitted assignment starts in.
pub fn initial_status(category: Category) -> AssignmentStatus {
    match category {
        Category::Technical => AssignmentStatus::UnderReview,
        Category::Writing | Category::Rewriting | Category::Correction => {
            AssignmentStatus::CheckingBalance
        }
    }
}

/// Whether `balance` pays for `cost`.
pub fn is_covered(balance: Decimal, cost: Decimal) -> bool {
    balance >= cost
}

/// Explicit transition table for status updates.
///
/// `completed` never appears as a target here; see [`check_completion`].
pub fn is_allowed(from: AssignmentStatus, to: AssignmentStatus) -> bool {
    use AssignmentStatus::*;
    matches!(
        (from, to),
        (Pending, UnderReview | CheckingBalance | Assigned | Cancelled)
            | (UnderReview, CheckingBalance | Assigned | Cancelled)
            | (CheckingBalance, CheckingBalance | Assigned | Cancelled)
            | (Assigned, CheckingBalance | Assigned | InProgress | Cancelled)
            | (InProgress, Cancelled)
    )
}

/// What a status update resolves to once the balance gate has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// Plain field update.
    Set(AssignmentStatus),
    /// Enter `assigned`. `tutor` replaces the recorded tutor when present.
    Assign { tutor: Option<Uuid> },
    /// Cost not covered: store `checking-balance`, then report the shortfall.
    Park { balance: Decimal, required: Decimal },
}

/// Decide how `assignment` moves towards `target`.
pub fn plan_update(
    assignment: &Assignment,
    target: AssignmentStatus,
    tutor: Option<Uuid>,
    balance: Decimal,
) -> Result<StatusChange> {
    let from = assignment.status;
    if !is_allowed(from, target) {
        return Err(DomainError::InvalidTransition { from, to: target });
    }

    match target {
        AssignmentStatus::Assigned => plan_assign(assignment, tutor, balance),
        AssignmentStatus::CheckingBalance => {
            if is_covered(balance, assignment.total_cost) {
                Ok(StatusChange::Assign { tutor: None })
            } else {
                Ok(StatusChange::Set(AssignmentStatus::CheckingBalance))
            }
        }
        other => Ok(StatusChange::Set(other)),
    }
}

/// The tutor "accept" / "assign" action.
pub fn plan_assign(
    assignment: &Assignment,
    tutor: Option<Uuid>,
    balance: Decimal,
) -> Result<StatusChange> {
    let from = assignment.status;
    if !is_allowed(from, AssignmentStatus::Assigned) {
        return Err(DomainError::InvalidTransition {
            from,
            to: AssignmentStatus::Assigned,
        });
    }

    if let (Some(current), Some(requested)) = (assignment.assigned_tutor, tutor) {
        if current != requested {
            return Err(DomainError::forbidden(
                "assignment is already held by another tutor",
            ));
        }
    }

    if !is_covered(balance, assignment.total_cost) {
        return Ok(StatusChange::Park {
            balance,
            required: assignment.total_cost,
        });
    }

    Ok(StatusChange::Assign { tutor })
}

/// Completion is allowed from any non-terminal state, exactly once.
pub fn check_completion(assignment: &Assignment) -> Result<()> {
    if assignment.status.is_terminal() {
        return Err(DomainError::InvalidTransition {
            from: assignment.status,
            to: AssignmentStatus::Completed,
        });
    }
    Ok(())
}

/// Ids of the gated assignments a balance of `balance` now pays for.
///
/// Each assignment is compared against the whole balance independently; the
/// balance is not reserved between them.
pub fn advance_gated(balance: Decimal, assignments: &[Assignment]) -> Vec<Uuid> {
    assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::CheckingBalance)
        .filter(|a| is_covered(balance, a.total_cost))
        .map(|a| a.id)
        .collect()
}
