//! # Types
//!
//! Shared data structures used across all modules of TutorDesk.
//!
//! ## Wire names
//!
//! Every enumeration here is wire-visible and stored as TEXT. The kebab-case
//! names produced by [`as_str`](AssignmentStatus::as_str) are the same ones
//! serde emits, so the database, the JSON API and the logs agree.
//!
//! ## Assignment status as a state machine
//!
//! ```text
//! pending ──► under-review ──────────┐
//!    │                               ▼
//!    └──────► checking-balance ◄──► assigned ──► in-progress ──► completed
//!
//! cancelled is reachable from every non-terminal state.
//! ```
//!
//! The rules live in [`crate::lifecycle`]; this module only names the states.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when a wire string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Implements `as_str`, `FromStr` and `Display` over a fixed wire-name table.
macro_rules! wire_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Return the wire / storage identifier.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ─────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

wire_enum!(Role, "role", {
    Student => "student",
    Tutor => "tutor",
    Admin => "admin",
});

/// Service family an order type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Writing,
    Rewriting,
    Correction,
    /// Needs manual review before the balance gate applies.
    Technical,
}

wire_enum!(Category, "category", {
    Writing => "writing",
    Rewriting => "rewriting",
    Correction => "correction",
    Technical => "technical",
});

/// The kind of work a student orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    Essay,
    ResearchPaper,
    DiscussionPost,
    Summary,
    BookReview,
    CaseStudy,
    LabReport,
    Thesis,
    RewriteEssay,
    RewritePaper,
    Paraphrasing,
    Proofreading,
    Editing,
    GrammarCheck,
    MathProblems,
    PhysicsProblems,
    EngineeringProject,
    Programming,
    Statistics,
    Calculations,
}

wire_enum!(OrderType, "order type", {
    Essay => "essay",
    ResearchPaper => "research-paper",
    DiscussionPost => "discussion-post",
    Summary => "summary",
    BookReview => "book-review",
    CaseStudy => "case-study",
    LabReport => "lab-report",
    Thesis => "thesis",
    RewriteEssay => "rewrite-essay",
    RewritePaper => "rewrite-paper",
    Paraphrasing => "paraphrasing",
    Proofreading => "proofreading",
    Editing => "editing",
    GrammarCheck => "grammar-check",
    MathProblems => "math-problems",
    PhysicsProblems => "physics-problems",
    EngineeringProject => "engineering-project",
    Programming => "programming",
    Statistics => "statistics",
    Calculations => "calculations",
});

impl OrderType {
    /// The category partition this order type falls into.
    pub fn category(&self) -> Category {
        use OrderType::*;
        match self {
            Essay | ResearchPaper | DiscussionPost | Summary | BookReview | CaseStudy
            | LabReport | Thesis => Category::Writing,
            RewriteEssay | RewritePaper | Paraphrasing => Category::Rewriting,
            Proofreading | Editing | GrammarCheck => Category::Correction,
            MathProblems | PhysicsProblems | EngineeringProject | Programming | Statistics
            | Calculations => Category::Technical,
        }
    }
}

/// Lifecycle status of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStatus {
    Pending,
    UnderReview,
    /// Balance-gated: waits until the owner's balance covers `total_cost`.
    CheckingBalance,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

wire_enum!(AssignmentStatus, "assignment status", {
    Pending => "pending",
    UnderReview => "under-review",
    CheckingBalance => "checking-balance",
    Assigned => "assigned",
    InProgress => "in-progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl AssignmentStatus {
    /// `completed` and `cancelled` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Status of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionStatus {
    /// Proof-based credit awaiting review.
    Pending,
    /// Applied at creation (instant credits, completion charges).
    Completed,
    Approved,
    Rejected,
    WithdrawRequested,
    RefundRequested,
}

wire_enum!(TransactionStatus, "transaction status", {
    Pending => "pending",
    Completed => "completed",
    Approved => "approved",
    Rejected => "rejected",
    WithdrawRequested => "withdraw-requested",
    RefundRequested => "refund-requested",
});

impl TransactionStatus {
    /// Whether an approver may still approve or reject the transaction.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::WithdrawRequested | Self::RefundRequested
        )
    }
}

/// How money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Paystack,
    Paypal,
    Bitcoin,
    Cashapp,
    /// System-generated debit when an assignment completes.
    AssignmentCharge,
}

wire_enum!(PaymentMethod, "payment method", {
    Paystack => "paystack",
    Paypal => "paypal",
    Bitcoin => "bitcoin",
    Cashapp => "cashapp",
    AssignmentCharge => "assignment-charge",
});

impl PaymentMethod {
    /// Card/processor payments settle immediately.
    pub fn is_instant(&self) -> bool {
        matches!(self, Self::Paystack | Self::Paypal)
    }

    /// Manual transfers need a proof-of-payment upload and an approver.
    pub fn requires_proof(&self) -> bool {
        matches!(self, Self::Bitcoin | Self::Cashapp)
    }
}

/// Which side of an assignment wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sender {
    Student,
    Tutor,
}

wire_enum!(Sender, "sender", {
    Student => "student",
    Tutor => "tutor",
});

/// Distinguishes the student's brief from the tutor's deliverables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    Brief,
    Completed,
}

wire_enum!(FileKind, "file kind", {
    Brief => "brief",
    Completed => "completed",
});

// ─────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────

/// A marketplace account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Mutated only by ledger operations. May go negative after a
    /// completion charge.
    pub balance: Decimal,
    /// Optimistic-lock counter, bumped on every balance write.
    #[serde(skip)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Reference to a blob held by the external blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub blob_id: String,
    pub filename: String,
    pub kind: FileKind,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: DateTime<Utc>,
}

/// One piece of work ordered by a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub order_type: OrderType,
    pub category: Category,
    pub subject: String,
    pub title: String,
    pub description: String,
    pub additional_requirements: String,
    pub deadline: DateTime<Utc>,
    pub pages: u32,
    pub price_per_page: Decimal,
    /// Computed by the client and trusted as input.
    pub total_cost: Decimal,
    pub status: AssignmentStatus,
    pub assigned_tutor: Option<Uuid>,
    pub tutor_comments: String,
    pub files: Vec<FileRef>,
    pub completed_files: Vec<FileRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A ledger entry. Positive amounts credit the owner, negative amounts debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub assignment_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: TransactionStatus,
    pub reference: String,
    pub proof_blob_id: Option<String>,
    pub proof_filename: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One chat line, scoped to exactly one assignment. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub assignment_id: Uuid,
    /// Always the assignment owner, whoever sent the message.
    pub student_id: Uuid,
    /// The assigned tutor at send time, or `None` while nobody is assigned.
    pub tutor_id: Option<Uuid>,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
