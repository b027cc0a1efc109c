//! Barter Core Types
//!
//! Type definitions for the barter FSM: the durable record, its
//! append-only history and message thread, and the request shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::status::{BarterStatus, PartyRole};
use crate::core_types::{ListingId, Talents, UserId};

/// Barter ID - ULID-based unique identifier
///
/// Using ULID provides:
/// - Monotonic, sortable IDs
/// - No coordination needed (no machine_id)
/// - 128-bit with good entropy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarterId(ulid::Ulid);

impl BarterId {
    /// Generate a new unique BarterId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for BarterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BarterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BarterId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// What is being exchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum BarterKind {
    /// Talents only
    Talent = 1,
    /// Goods/services both ways, no currency
    DirectSwap = 2,
    /// Goods/services plus a talent amount
    Combined = 3,
}

impl BarterKind {
    /// Whether completing this kind moves talents through the ledger
    #[inline]
    pub fn involves_talents(&self) -> bool {
        matches!(self, BarterKind::Talent | BarterKind::Combined)
    }

    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(BarterKind::Talent),
            2 => Some(BarterKind::DirectSwap),
            3 => Some(BarterKind::Combined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BarterKind::Talent => "TALENT",
            BarterKind::DirectSwap => "DIRECT_SWAP",
            BarterKind::Combined => "COMBINED",
        }
    }
}

impl fmt::Display for BarterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One append-only status history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: BarterStatus,
    /// Party that requested the transition
    pub actor: UserId,
    /// Commit timestamp (millis)
    pub at: i64,
}

/// One entry of the barter's message thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub sender: UserId,
    pub body: String,
    pub at: i64,
    /// System messages are appended automatically on every transition
    /// and are part of the audit trail
    pub system: bool,
}

impl ThreadMessage {
    pub fn system(sender: UserId, body: impl Into<String>) -> Self {
        Self {
            sender,
            body: body.into(),
            at: chrono::Utc::now().timestamp_millis(),
            system: true,
        }
    }
}

/// A party's rating of its counterparty, settable at most once, only
/// after completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    /// 1..=5
    pub score: u8,
    pub comment: String,
    pub at: i64,
}

/// Request shape for proposing a new barter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBarter {
    pub initiator: UserId,
    pub recipient: UserId,
    pub listing: Option<ListingId>,
    pub kind: BarterKind,
    pub talent_amount: Talents,
}

/// The durable entity representing one proposed exchange
///
/// Mutated only through the coordinator; `status` and `talent_amount`
/// are frozen once a terminal state is reached, while `history` and
/// `messages` stay append-only (rating system messages arrive after
/// completion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarterRecord {
    pub barter_id: BarterId,
    pub initiator: UserId,
    pub recipient: UserId,
    pub listing: Option<ListingId>,
    /// Set once the linked listing's deactivation has been confirmed;
    /// the reconcile worker retries while this is false on a completed
    /// barter
    pub listing_released: bool,
    pub kind: BarterKind,
    pub talent_amount: Talents,
    pub status: BarterStatus,
    /// Append-only, totally ordered by commit order - the sole audit
    /// trail for "why is this barter in this state"
    pub history: Vec<StatusChange>,
    pub messages: Vec<ThreadMessage>,
    pub initiator_rating: Option<Rating>,
    pub recipient_rating: Option<Rating>,
    /// Created timestamp (millis)
    pub created_at: i64,
    /// Last updated timestamp (millis)
    pub updated_at: i64,
}

impl BarterRecord {
    /// Create a new record in PROPOSED state with its seed history
    /// entry and system message
    pub fn new(barter_id: BarterId, req: &NewBarter) -> Self {
        let now = chrono::Utc::now().timestamp_millis();

        Self {
            barter_id,
            initiator: req.initiator,
            recipient: req.recipient,
            listing: req.listing,
            listing_released: false,
            kind: req.kind,
            talent_amount: req.talent_amount,
            status: BarterStatus::Proposed,
            history: vec![StatusChange {
                status: BarterStatus::Proposed,
                actor: req.initiator,
                at: now,
            }],
            messages: vec![ThreadMessage {
                sender: req.initiator,
                body: format!("Barter proposed ({})", req.kind),
                at: now,
                system: true,
            }],
            initiator_rating: None,
            recipient_rating: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Which side of the barter `actor` is on, `None` for outsiders
    pub fn role_of(&self, actor: UserId) -> Option<PartyRole> {
        if actor == self.initiator {
            Some(PartyRole::Initiator)
        } else if actor == self.recipient {
            Some(PartyRole::Recipient)
        } else {
            None
        }
    }

    /// User id of the other side
    pub fn counterparty(&self, role: PartyRole) -> UserId {
        match role {
            PartyRole::Initiator => self.recipient,
            PartyRole::Recipient => self.initiator,
        }
    }

    /// The rating slot a role writes into
    pub fn rating_of(&self, role: PartyRole) -> &Option<Rating> {
        match role {
            PartyRole::Initiator => &self.initiator_rating,
            PartyRole::Recipient => &self.recipient_rating,
        }
    }
}

impl fmt::Display for BarterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Barter[{}] {} <-> {} kind={} amount={} status={}",
            self.barter_id,
            self.initiator,
            self.recipient,
            self.kind,
            self.talent_amount,
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_barter() -> NewBarter {
        NewBarter {
            initiator: 1,
            recipient: 2,
            listing: Some(7),
            kind: BarterKind::Talent,
            talent_amount: 15,
        }
    }

    #[test]
    fn kind_id_round_trip() {
        for kind in [BarterKind::Talent, BarterKind::DirectSwap, BarterKind::Combined] {
            assert_eq!(BarterKind::from_id(kind.id()), Some(kind));
        }
        assert!(BarterKind::from_id(0).is_none());
        assert!(BarterKind::from_id(4).is_none());
    }

    #[test]
    fn talent_and_combined_involve_talents() {
        assert!(BarterKind::Talent.involves_talents());
        assert!(BarterKind::Combined.involves_talents());
        assert!(!BarterKind::DirectSwap.involves_talents());
    }

    #[test]
    fn new_record_starts_proposed_with_seed_audit() {
        let record = BarterRecord::new(BarterId::new(), &new_barter());

        assert_eq!(record.status, BarterStatus::Proposed);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].status, BarterStatus::Proposed);
        assert_eq!(record.history[0].actor, 1);
        assert_eq!(record.messages.len(), 1);
        assert!(record.messages[0].system);
        assert!(!record.listing_released);
        assert!(record.initiator_rating.is_none());
        assert!(record.recipient_rating.is_none());
    }

    #[test]
    fn role_resolution() {
        let record = BarterRecord::new(BarterId::new(), &new_barter());
        assert_eq!(record.role_of(1), Some(PartyRole::Initiator));
        assert_eq!(record.role_of(2), Some(PartyRole::Recipient));
        assert_eq!(record.role_of(3), None);
        assert_eq!(record.counterparty(PartyRole::Initiator), 2);
        assert_eq!(record.counterparty(PartyRole::Recipient), 1);
    }

    #[test]
    fn barter_id_parse_round_trip() {
        let id = BarterId::new();
        let parsed: BarterId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
