//! External Collaborator Adapters
//!
//! The core operates on resolved, typed identifiers only; user-profile
//! and listing-catalog concerns live behind these seams. Deactivation
//! must be idempotent per barter_id so the reconcile worker can retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::types::BarterId;
use crate::core_types::{ListingId, UserId};

/// Operation result from external collaborators
#[derive(Debug, Clone)]
pub enum OpResult {
    /// Operation completed successfully
    Success,
    /// Operation failed with explicit error (safe to leave for retry)
    Failed(String),
    /// Operation state unknown (timeout, network error) - must retry
    Pending,
}

impl OpResult {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, OpResult::Success)
    }

    #[inline]
    pub fn is_explicit_fail(&self) -> bool {
        matches!(self, OpResult::Failed(_))
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, OpResult::Pending)
    }
}

/// A user's public profile as the directory exposes it to the core
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: UserId,
    pub rating_count: u32,
    /// Arithmetic mean over all ratings ever received, rounded to one
    /// decimal place; 0.0 while unrated
    pub average_rating: f64,
}

/// User directory - profile reads and rating aggregation
///
/// Balances are NOT reachable through this trait; they belong to the
/// ledger exclusively.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user: UserId) -> Option<UserProfile>;

    /// Append one rating to the user's profile and recompute the running
    /// average. Returns the new average, `None` for unknown users.
    async fn record_rating(&self, user: UserId, score: u8) -> Option<f64>;
}

/// Listing catalog - existence checks and deactivation-on-completion
#[async_trait]
pub trait ListingCatalog: Send + Sync {
    async fn exists(&self, listing: ListingId) -> bool;

    /// Deactivate a listing and link the completed barter to it.
    ///
    /// # Idempotency
    /// Repeat calls with the same (listing, barter_id) must succeed
    /// without further effect.
    async fn deactivate(&self, listing: ListingId, barter_id: BarterId) -> OpResult;
}

// === In-memory implementations (embedded use, demos, tests) ===

#[derive(Debug, Default)]
struct ProfileInner {
    rating_count: u32,
    rating_sum: u64,
}

impl ProfileInner {
    fn average(&self) -> f64 {
        if self.rating_count == 0 {
            return 0.0;
        }
        let mean = self.rating_sum as f64 / self.rating_count as f64;
        (mean * 10.0).round() / 10.0
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    profiles: DashMap<UserId, Arc<Mutex<ProfileInner>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: UserId) {
        self.profiles.entry(user).or_default();
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn get_user(&self, user: UserId) -> Option<UserProfile> {
        let inner = self.profiles.get(&user)?.value().clone();
        let guard = inner.lock().await;
        Some(UserProfile {
            user_id: user,
            rating_count: guard.rating_count,
            average_rating: guard.average(),
        })
    }

    async fn record_rating(&self, user: UserId, score: u8) -> Option<f64> {
        let inner = self.profiles.get(&user)?.value().clone();
        let mut guard = inner.lock().await;
        guard.rating_count += 1;
        guard.rating_sum += score as u64;
        Some(guard.average())
    }
}

#[derive(Debug)]
struct ListingState {
    active: bool,
    completed_by: Option<BarterId>,
}

/// In-memory catalog with fault-injection knobs so tests and demos can
/// exercise the reconcile path
#[derive(Default)]
pub struct MemoryCatalog {
    listings: DashMap<ListingId, Arc<Mutex<ListingState>>>,
    fail_deactivate: AtomicBool,
    pending_deactivate: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listing(&self, listing: ListingId) {
        self.listings.entry(listing).or_insert_with(|| {
            Arc::new(Mutex::new(ListingState {
                active: true,
                completed_by: None,
            }))
        });
    }

    /// Make `deactivate` return `Failed` until cleared
    pub fn set_fail_deactivate(&self, fail: bool) {
        self.fail_deactivate.store(fail, Ordering::SeqCst);
    }

    /// Make `deactivate` return `Pending` until cleared
    pub fn set_pending_deactivate(&self, pending: bool) {
        self.pending_deactivate.store(pending, Ordering::SeqCst);
    }

    pub async fn is_active(&self, listing: ListingId) -> Option<bool> {
        let inner = self.listings.get(&listing)?.value().clone();
        let guard = inner.lock().await;
        Some(guard.active)
    }

    pub async fn completed_by(&self, listing: ListingId) -> Option<BarterId> {
        let inner = self.listings.get(&listing)?.value().clone();
        let guard = inner.lock().await;
        guard.completed_by
    }
}

#[async_trait]
impl ListingCatalog for MemoryCatalog {
    async fn exists(&self, listing: ListingId) -> bool {
        self.listings.contains_key(&listing)
    }

    async fn deactivate(&self, listing: ListingId, barter_id: BarterId) -> OpResult {
        if self.pending_deactivate.load(Ordering::SeqCst) {
            return OpResult::Pending;
        }
        if self.fail_deactivate.load(Ordering::SeqCst) {
            return OpResult::Failed("catalog unavailable".to_string());
        }

        let Some(entry) = self.listings.get(&listing) else {
            return OpResult::Failed(format!("listing {listing} not found"));
        };
        let inner = entry.value().clone();
        drop(entry);

        let mut guard = inner.lock().await;
        // Idempotent: repeat deactivation for the same barter is a no-op
        guard.active = false;
        guard.completed_by.get_or_insert(barter_id);
        OpResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_result_predicates() {
        assert!(OpResult::Success.is_success());
        assert!(!OpResult::Success.is_explicit_fail());
        assert!(!OpResult::Success.is_pending());

        let fail = OpResult::Failed("x".to_string());
        assert!(fail.is_explicit_fail());
        assert!(!fail.is_success());

        assert!(OpResult::Pending.is_pending());
    }

    #[tokio::test]
    async fn rating_average_rounds_to_one_decimal() {
        let directory = MemoryDirectory::new();
        directory.add_user(1);

        assert_eq!(directory.record_rating(1, 5).await, Some(5.0));
        assert_eq!(directory.record_rating(1, 4).await, Some(4.5));
        // (5 + 4 + 2) / 3 = 3.666... -> 3.7
        assert_eq!(directory.record_rating(1, 2).await, Some(3.7));

        let profile = directory.get_user(1).await.unwrap();
        assert_eq!(profile.rating_count, 3);
        assert_eq!(profile.average_rating, 3.7);
    }

    #[tokio::test]
    async fn unknown_user_gets_no_rating() {
        let directory = MemoryDirectory::new();
        assert!(directory.record_rating(99, 5).await.is_none());
        assert!(directory.get_user(99).await.is_none());
    }

    #[tokio::test]
    async fn deactivate_is_idempotent_per_barter() {
        let catalog = MemoryCatalog::new();
        catalog.add_listing(7);
        let barter = BarterId::new();

        assert!(catalog.deactivate(7, barter).await.is_success());
        assert!(catalog.deactivate(7, barter).await.is_success());
        assert_eq!(catalog.is_active(7).await, Some(false));
        assert_eq!(catalog.completed_by(7).await, Some(barter));
    }

    #[tokio::test]
    async fn fault_knobs_drive_results() {
        let catalog = MemoryCatalog::new();
        catalog.add_listing(7);

        catalog.set_pending_deactivate(true);
        assert!(catalog.deactivate(7, BarterId::new()).await.is_pending());

        catalog.set_pending_deactivate(false);
        catalog.set_fail_deactivate(true);
        assert!(
            catalog
                .deactivate(7, BarterId::new())
                .await
                .is_explicit_fail()
        );

        catalog.set_fail_deactivate(false);
        assert!(catalog.deactivate(7, BarterId::new()).await.is_success());
    }
}
