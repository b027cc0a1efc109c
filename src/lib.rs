//! barter-core - Barter transaction engine
//!
//! A state-machine-driven barter negotiation core coupled to an atomic
//! talent-currency ledger.
//!
//! # Modules
//!
//! - [`core_types`] - Core type aliases (UserId, ListingId, Talents)
//! - [`balance`] - Enforced talent balance type
//! - [`ledger`] - Atomic transfer primitive over user balances
//! - [`exchange`] - Barter FSM: records, transitions, ratings, events
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing initialization

// Core types - must be first!
pub mod core_types;

pub mod balance;
pub mod config;
pub mod exchange;
pub mod ledger;
pub mod logging;

// Convenient re-exports at crate root
pub use balance::TalentBalance;
pub use config::AppConfig;
pub use core_types::{ListingId, Talents, UserId};
pub use exchange::{
    BarterCoordinator, BarterId, BarterKind, BarterRecord, BarterStatus, BarterStore,
    ExchangeError, MemoryBarterStore, NewBarter, PartyRole, RatingService, ReconcileWorker,
    TransitionEvent,
};
pub use ledger::{Ledger, LedgerError, MemoryLedger, PgLedger, TransferReceipt};
