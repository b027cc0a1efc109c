//! Exchange Error Types
//!
//! The error taxonomy for barter operations. `code()` gives stable
//! machine-readable codes; `http_status()` suggests a response status
//! for callers that surface these over HTTP.

use thiserror::Error;

use crate::core_types::{ListingId, Talents, UserId};
use crate::ledger::LedgerError;

#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    // === Validation Errors ===
    #[error("Initiator and recipient cannot be the same user")]
    SelfBarter,

    #[error("Talent amount must be greater than zero for this barter kind")]
    InvalidAmount,

    #[error("Listing not found: {0}")]
    ListingNotFound(ListingId),

    // === Lookup / Authorization ===
    #[error("Barter not found: {0}")]
    NotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("User {0} is not a party to this barter")]
    Forbidden(UserId),

    // === State Machine ===
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    // === Ledger ===
    #[error(
        "Insufficient balance: user {user} holds {available} talents, completion needs {required}"
    )]
    InsufficientBalance {
        user: UserId,
        available: Talents,
        required: Talents,
    },

    // === Rating ===
    #[error("Barter must be completed before rating")]
    NotCompleted,

    #[error("Rating score must be between 1 and 5, got {0}")]
    InvalidScore(u8),

    #[error("User {0} has already rated this barter")]
    AlreadyRated(UserId),

    // === Concurrency ===
    #[error("Barter is locked by another request, retry later")]
    Busy,

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl ExchangeError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::SelfBarter => "SELF_BARTER",
            ExchangeError::InvalidAmount => "INVALID_AMOUNT",
            ExchangeError::ListingNotFound(_) => "LISTING_NOT_FOUND",
            ExchangeError::NotFound(_) => "BARTER_NOT_FOUND",
            ExchangeError::UserNotFound(_) => "USER_NOT_FOUND",
            ExchangeError::Forbidden(_) => "FORBIDDEN",
            ExchangeError::InvalidTransition(_) => "INVALID_TRANSITION",
            ExchangeError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ExchangeError::NotCompleted => "NOT_COMPLETED",
            ExchangeError::InvalidScore(_) => "INVALID_SCORE",
            ExchangeError::AlreadyRated(_) => "ALREADY_RATED",
            ExchangeError::Busy => "BUSY",
            ExchangeError::DatabaseError(_) => "DATABASE_ERROR",
            ExchangeError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            ExchangeError::SelfBarter
            | ExchangeError::InvalidAmount
            | ExchangeError::InvalidScore(_) => 400,
            ExchangeError::Forbidden(_) => 403,
            ExchangeError::NotFound(_)
            | ExchangeError::UserNotFound(_)
            | ExchangeError::ListingNotFound(_) => 404,
            ExchangeError::InvalidTransition(_)
            | ExchangeError::NotCompleted
            | ExchangeError::AlreadyRated(_)
            | ExchangeError::InsufficientBalance { .. } => 422,
            ExchangeError::Busy => 429,
            ExchangeError::DatabaseError(_) | ExchangeError::SystemError(_) => 500,
        }
    }

    /// Callers may retry `Busy` with backoff; every other error is
    /// terminal for the attempt and surfaced as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Busy)
    }
}

impl From<LedgerError> for ExchangeError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance {
                user,
                available,
                required,
            } => ExchangeError::InsufficientBalance {
                user,
                available,
                required,
            },
            LedgerError::Busy => ExchangeError::Busy,
            LedgerError::Storage(msg) => ExchangeError::DatabaseError(msg),
            // ZeroAmount / SameAccount / UnknownAccount are screened out
            // at proposal time; reaching here means invariants broke
            other => ExchangeError::SystemError(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ExchangeError {
    fn from(e: sqlx::Error) -> Self {
        ExchangeError::DatabaseError(e.to_string())
    }
}

impl From<anyhow::Error> for ExchangeError {
    fn from(e: anyhow::Error) -> Self {
        ExchangeError::SystemError(e.to_string())
    }
}
