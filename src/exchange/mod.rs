//! Barter Exchange FSM
//!
//! Governs how two parties negotiate, accept, complete, cancel or
//! dispute an exchange, and how talents move between balances exactly
//! once, consistently with barter status.
//!
//! # State Machine
//!
//! ```text
//! PROPOSED → ACCEPTED → COMPLETED
//!     ↓         ↓    ↘
//! REJECTED  CANCELLED  DISPUTED → RESOLVED
//!     (cancel also legal from DISPUTED)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Single transition table**: validity is one lookup in
//!    [`status::plan_transition`], never scattered conditionals
//! 2. **Ledger-before-status**: completion moves talents first; a
//!    failed transfer leaves the barter exactly where it was
//! 3. **CAS commits**: the status write, history entry and system
//!    message land together or not at all
//! 4. **Append-only audit**: `history` and `messages` are never
//!    mutated or reordered; they are the sole audit trail

pub mod adapters;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod events;
pub mod rating;
pub mod status;
pub mod store;
pub mod types;
pub mod worker;

// Re-exports for convenience
pub use adapters::{ListingCatalog, MemoryCatalog, MemoryDirectory, OpResult, UserDirectory};
pub use coordinator::{BarterCoordinator, LockRegistry};
pub use db::PgBarterStore;
pub use error::ExchangeError;
pub use events::{BroadcastSink, EventSink, NullSink, TransitionEvent};
pub use rating::{RatingOutcome, RatingService};
pub use status::{BarterStatus, PartyRole, TransitionPlan, plan_transition};
pub use store::{BarterStore, MemoryBarterStore};
pub use types::{BarterId, BarterKind, BarterRecord, NewBarter, Rating, StatusChange, ThreadMessage};
pub use worker::ReconcileWorker;
