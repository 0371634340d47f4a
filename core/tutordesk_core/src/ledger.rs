//! # Ledger effects
//!
//! Balance arithmetic for every transaction kind. Nothing here touches
//! storage: the backend reads the current balance, calls into this module and
//! writes the result back under an optimistic lock.
//!
//! | Status at approval   | Effect on balance                  |
//! |----------------------|------------------------------------|
//! | `pending`            | `+ amount`                         |
//! | `withdraw-requested` | `- amount`, fails if it would go below zero |
//! | `refund-requested`   | `+ amount`                         |
//! | anything else        | [`DomainError::AlreadyResolved`]   |

use rust_decimal::Decimal;

use crate::errors::{DomainError, Result};
use crate::types::{PaymentMethod, Transaction, TransactionStatus};

/// Reject zero and negative request amounts.
pub fn require_positive(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::invalid("amount must be greater than zero"));
    }
    Ok(amount)
}

/// Status a new credit starts in, by method.
pub fn credit_status(method: PaymentMethod) -> Result<TransactionStatus> {
    if method.is_instant() {
        Ok(TransactionStatus::Completed)
    } else if method.requires_proof() {
        Ok(TransactionStatus::Pending)
    } else {
        Err(DomainError::invalid(format!(
            "{method} cannot be used for a credit"
        )))
    }
}

/// Optimistic check made when a withdrawal is requested. Nothing is held;
/// approval checks again.
pub fn check_withdrawal(balance: Decimal, amount: Decimal) -> Result<()> {
    require_positive(amount)?;
    if balance < amount {
        return Err(DomainError::InsufficientBalance {
            balance,
            required: amount,
        });
    }
    Ok(())
}

/// Balance after approving `tx` against `balance`.
pub fn approval_effect(tx: &Transaction, balance: Decimal) -> Result<Decimal> {
    match tx.status {
        TransactionStatus::Pending | TransactionStatus::RefundRequested => {
            Ok(balance + tx.amount)
        }
        TransactionStatus::WithdrawRequested => {
            if balance < tx.amount {
                return Err(DomainError::InsufficientBalance {
                    balance,
                    required: tx.amount,
                });
            }
            Ok(balance - tx.amount)
        }
        TransactionStatus::Completed
        | TransactionStatus::Approved
        | TransactionStatus::Rejected => Err(DomainError::AlreadyResolved),
    }
}

/// Rejection is only possible while the transaction is open.
pub fn check_rejectable(tx: &Transaction) -> Result<()> {
    if !tx.status.is_open() {
        return Err(DomainError::AlreadyResolved);
    }
    Ok(())
}

/// Signed amount of the charge recorded when an assignment completes.
pub fn completion_charge(total_cost: Decimal) -> Decimal {
    -total_cost.abs()
}
