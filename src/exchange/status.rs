//! Barter FSM Status Definitions
//!
//! Status IDs are stable `i16`s for PostgreSQL storage.
//! Terminal states: COMPLETED (40), RESOLVED (30), REJECTED (-10),
//! CANCELLED (-20).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Barter FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum BarterStatus {
    /// Initial state - the initiator has proposed the exchange
    Proposed = 0,

    /// The recipient has accepted; fulfilment is in progress
    Accepted = 10,

    /// One party has raised a dispute over an accepted exchange
    Disputed = 20,

    /// Terminal: dispute settled without completion
    Resolved = 30,

    /// Terminal: exchange fulfilled; talents moved, listing released
    Completed = 40,

    /// Terminal: the recipient declined the proposal
    Rejected = -10,

    /// Terminal: either party withdrew before completion
    Cancelled = -20,
}

/// Which side of the barter the acting user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyRole {
    Initiator,
    Recipient,
}

impl PartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyRole::Initiator => "INITIATOR",
            PartyRole::Recipient => "RECIPIENT",
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Side effects a legal transition requires of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionPlan {
    /// Move `talent_amount` from initiator to recipient before the
    /// status write (talent-bearing kinds only)
    pub transfer_talents: bool,
    /// Deactivate the linked listing after commit (when one is linked)
    pub release_listing: bool,
}

/// Why a requested transition was denied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("cannot transition from {from} to {to}")]
    IllegalEdge { from: BarterStatus, to: BarterStatus },

    #[error("only the {required} may move {from} to {to}")]
    RoleNotAllowed {
        required: PartyRole,
        from: BarterStatus,
        to: BarterStatus,
    },
}

impl BarterStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BarterStatus::Completed
                | BarterStatus::Resolved
                | BarterStatus::Rejected
                | BarterStatus::Cancelled
        )
    }

    /// Get the numeric status ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL status ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(BarterStatus::Proposed),
            10 => Some(BarterStatus::Accepted),
            20 => Some(BarterStatus::Disputed),
            30 => Some(BarterStatus::Resolved),
            40 => Some(BarterStatus::Completed),
            -10 => Some(BarterStatus::Rejected),
            -20 => Some(BarterStatus::Cancelled),
            _ => None,
        }
    }

    /// Get human-readable status name
    pub fn as_str(&self) -> &'static str {
        match self {
            BarterStatus::Proposed => "PROPOSED",
            BarterStatus::Accepted => "ACCEPTED",
            BarterStatus::Disputed => "DISPUTED",
            BarterStatus::Resolved => "RESOLVED",
            BarterStatus::Completed => "COMPLETED",
            BarterStatus::Rejected => "REJECTED",
            BarterStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BarterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for BarterStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        BarterStatus::from_id(value).ok_or(())
    }
}

/// Decide whether `(from -> to)` is legal for the acting role, and what
/// side effects the move requires.
///
/// Pure function: validity is one table lookup plus a role layer, never
/// replicated logic at call sites.
pub fn plan_transition(
    from: BarterStatus,
    to: BarterStatus,
    role: PartyRole,
) -> Result<TransitionPlan, Denial> {
    use BarterStatus::*;

    let legal = matches!(
        (from, to),
        (Proposed, Accepted | Rejected | Cancelled)
            | (Accepted, Completed | Cancelled | Disputed)
            | (Disputed, Resolved | Cancelled)
    );
    if !legal {
        return Err(Denial::IllegalEdge { from, to });
    }

    // The initiator proposed; only the counterparty accepts or declines.
    // Everything else is open to both parties.
    if matches!((from, to), (Proposed, Accepted | Rejected)) && role != PartyRole::Recipient {
        return Err(Denial::RoleNotAllowed {
            required: PartyRole::Recipient,
            from,
            to,
        });
    }

    Ok(TransitionPlan {
        transfer_talents: to == Completed,
        release_listing: to == Completed,
    })
}
