//! # TutorDesk core
//!
//! Domain rules of the TutorDesk tutoring marketplace, free of any I/O. The
//! `backend/api` crate owns persistence and transport and calls into this
//! crate for every decision:
//!
//! | Concern            | Module          | Entry point(s)                                  |
//! |--------------------|-----------------|-------------------------------------------------|
//! | Vocabulary         | [`types`]       | [`AssignmentStatus`], [`TransactionStatus`], …  |
//! | Lifecycle          | [`lifecycle`]   | `initial_status`, `plan_update`, `plan_assign`, `check_completion`, `advance_gated` |
//! | Ledger             | [`ledger`]      | `credit_status`, `check_withdrawal`, `approval_effect`, `completion_charge` |
//! | Chat authorization | [`chat`]        | `authorize`, `normalize_content`                |
//!
//! All fallible functions return [`DomainError`].

pub mod chat;
pub mod errors;
pub mod ledger;
pub mod lifecycle;
pub mod types;


pub use errors::{DomainError, Result};
pub use types::{
    Assignment, AssignmentStatus, Category, FileKind, FileRef, Message, OrderType,
    PaymentMethod, Role, Sender, Transaction, TransactionStatus, UnknownVariant, User,
};
