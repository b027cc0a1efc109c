//! Talent Ledger
//!
//! The ledger is the ONLY component allowed to move talent balances.
//! It knows nothing about a barter's business meaning; it is handed a
//! `(from, to, amount, barter_id)` tuple and performs an exactly-once,
//! all-or-nothing transfer between the two balances.
//!
//! # Safety Invariants
//!
//! 1. **All-or-nothing**: either both balances change or neither does;
//!    no intermediate state is observable by another caller
//! 2. **Check-inside-lock**: insufficient funds is decided inside the
//!    atomic unit, never before it
//! 3. **No bypass**: balance fields are private ([`crate::balance`]);
//!    nothing outside this module can read-modify-write a balance

pub mod journal;
pub mod memory;
pub mod pg;

pub use journal::JournalWriter;
pub use memory::MemoryLedger;
pub use pg::PgLedger;

use async_trait::async_trait;
use thiserror::Error;

use crate::core_types::{Talents, UserId};
use crate::exchange::types::BarterId;

/// Ledger error types
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Source and target account cannot be the same")]
    SameAccount,

    #[error("Account not found: {0}")]
    UnknownAccount(UserId),

    #[error("Insufficient balance: user {user} holds {available}, transfer needs {required}")]
    InsufficientBalance {
        user: UserId,
        available: Talents,
        required: Talents,
    },

    #[error("Balance lock contention, retry later")]
    Busy,

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::ZeroAmount => "ZERO_AMOUNT",
            LedgerError::SameAccount => "SAME_ACCOUNT",
            LedgerError::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::Busy => "BUSY",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Retryable errors may succeed on a later attempt without any
    /// external change; `InsufficientBalance` is recoverable but only
    /// once the source account is funded.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Busy)
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

/// Proof of a committed transfer, one per ledger mutation
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    /// Barter the transfer settles (audit linkage only)
    pub barter_id: BarterId,
    pub from: UserId,
    pub to: UserId,
    pub amount: Talents,
    /// Source balance after the debit
    pub from_after: Talents,
    /// Target balance after the credit
    pub to_after: Talents,
    /// Commit timestamp (millis)
    pub at: i64,
}

/// Atomic transfer primitive over per-user talent balances
///
/// Implementations must guarantee that two concurrent transfers over
/// disjoint user pairs proceed without blocking each other, while
/// transfers touching the same user serialize on a consistent balance.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create an account seeded with `initial` talents.
    /// Idempotent: opening an existing account is a no-op.
    async fn open_account(&self, user: UserId, initial: Talents) -> Result<(), LedgerError>;

    /// Current balance of a user
    async fn balance_of(&self, user: UserId) -> Result<Talents, LedgerError>;

    /// Move `amount` talents from `from` to `to`, all-or-nothing.
    ///
    /// `barter_id` is recorded on the receipt and journal entry; the
    /// ledger has no awareness of barter status.
    async fn transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: Talents,
        barter_id: BarterId,
    ) -> Result<TransferReceipt, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(LedgerError::ZeroAmount.code(), "ZERO_AMOUNT");
        assert_eq!(
            LedgerError::InsufficientBalance {
                user: 1,
                available: 0,
                required: 5
            }
            .code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(LedgerError::Busy.code(), "BUSY");
    }

    #[test]
    fn only_busy_is_retryable() {
        assert!(LedgerError::Busy.is_retryable());
        assert!(!LedgerError::SameAccount.is_retryable());
        assert!(
            !LedgerError::InsufficientBalance {
                user: 1,
                available: 0,
                required: 5
            }
            .is_retryable()
        );
    }
}
