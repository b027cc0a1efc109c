//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// User ID - globally unique, immutable after assignment.
///
/// Owned by the external user directory; the core only ever sees resolved
/// numeric ids, never expanded user documents.
pub type UserId = u64;

/// Listing ID - identifier of a catalog item a barter may be tied to.
///
/// The catalog itself is an external collaborator; the core only checks
/// existence and requests deactivation on completion.
pub type ListingId = u64;

/// Talent amount - the platform's internal scarce currency unit.
///
/// Always an integral number of talents. Balances are non-negative by
/// construction (unsigned + checked arithmetic in [`crate::balance`]).
pub type Talents = u64;
