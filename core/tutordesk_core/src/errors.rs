//! Domain error taxonomy shared by every TutorDesk component.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::AssignmentStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: Decimal, required: Decimal },

    #[error("Cannot move assignment from {from} to {to}")]
    InvalidTransition {
        from: AssignmentStatus,
        to: AssignmentStatus,
    },

    #[error("Transaction has already been resolved")]
    AlreadyResolved,
}

impl DomainError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
