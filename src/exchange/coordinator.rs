//! Transition Coordinator
//!
//! The externally callable entry point for barter mutations. Loads the
//! record, authorizes the caller, asks the state machine whether the
//! move is legal, invokes the ledger when required, CAS-commits the new
//! status with its history entry and system message, and emits the
//! transition event - one logically atomic unit per request.
//!
//! # Safety Invariants
//!
//! 1. **Per-barter serialization**: concurrent requests on one barter
//!    queue on its lock; a bounded wait fails with `Busy`
//! 2. **Ledger-before-status**: on completion the talent transfer
//!    commits first; if it fails, no status, history or message is
//!    written and the barter stays where it was
//! 3. **Commit-before-event**: the transition event is emitted only
//!    after the status write is durable
//! 4. **Listing release never rolls back**: deactivation failure is
//!    logged and left to the reconcile worker

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use super::adapters::{ListingCatalog, UserDirectory};
use super::error::ExchangeError;
use super::events::{EventSink, TransitionEvent};
use super::status::{self, BarterStatus};
use super::store::BarterStore;
use super::types::{BarterId, BarterRecord, NewBarter, StatusChange, ThreadMessage};
use crate::core_types::UserId;
use crate::ledger::Ledger;

/// Per-barter lock registry
///
/// Shared between the coordinator and the rating service so that every
/// mutation of one record serializes on the same lock.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<BarterId, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the barter's lock, waiting at most `timeout`
    pub async fn acquire(
        &self,
        id: BarterId,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, ExchangeError> {
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| ExchangeError::Busy)
    }

    /// Drop the registry entry for `id` when nobody holds or awaits it.
    ///
    /// Called after terminal commits and rating writes so the map does
    /// not accumulate an entry per barter for the process lifetime. A
    /// later acquire simply recreates the entry.
    pub fn release(&self, id: BarterId) {
        // remove_if holds the shard lock across the predicate, so a
        // count of 1 means no guard and no waiter can appear mid-check
        self.locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn contains(&self, id: BarterId) -> bool {
        self.locks.contains_key(&id)
    }
}

pub struct BarterCoordinator {
    store: Arc<dyn BarterStore>,
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn UserDirectory>,
    catalog: Arc<dyn ListingCatalog>,
    events: Arc<dyn EventSink>,
    locks: Arc<LockRegistry>,
    lock_timeout: Duration,
}

impl BarterCoordinator {
    pub fn new(
        store: Arc<dyn BarterStore>,
        ledger: Arc<dyn Ledger>,
        directory: Arc<dyn UserDirectory>,
        catalog: Arc<dyn ListingCatalog>,
        events: Arc<dyn EventSink>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            directory,
            catalog,
            events,
            locks: Arc::new(LockRegistry::new()),
            lock_timeout,
        }
    }

    /// Lock registry, shared with the rating service
    pub fn locks(&self) -> Arc<LockRegistry> {
        self.locks.clone()
    }

    /// Store handle for the reconcile worker
    pub fn store(&self) -> Arc<dyn BarterStore> {
        self.store.clone()
    }

    /// Catalog handle for the reconcile worker
    pub fn catalog(&self) -> Arc<dyn ListingCatalog> {
        self.catalog.clone()
    }

    /// Create a barter in PROPOSED state
    pub async fn propose(&self, req: NewBarter) -> Result<BarterRecord, ExchangeError> {
        if req.initiator == req.recipient {
            return Err(ExchangeError::SelfBarter);
        }
        // A currency amount is only meaningful for talent-bearing kinds
        if req.kind.involves_talents() && req.talent_amount == 0 {
            return Err(ExchangeError::InvalidAmount);
        }
        if !req.kind.involves_talents() && req.talent_amount != 0 {
            return Err(ExchangeError::InvalidAmount);
        }

        for user in [req.initiator, req.recipient] {
            if self.directory.get_user(user).await.is_none() {
                return Err(ExchangeError::UserNotFound(user));
            }
        }
        if let Some(listing) = req.listing
            && !self.catalog.exists(listing).await
        {
            return Err(ExchangeError::ListingNotFound(listing));
        }

        let record = BarterRecord::new(BarterId::new(), &req);
        self.store.insert(&record).await?;

        info!(
            barter_id = %record.barter_id,
            initiator = record.initiator,
            recipient = record.recipient,
            kind = %record.kind,
            amount = record.talent_amount,
            "Barter proposed"
        );

        Ok(record)
    }

    /// Load a barter record
    pub async fn get(&self, id: BarterId) -> Result<BarterRecord, ExchangeError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ExchangeError::NotFound(id.to_string()))
    }

    /// Request a status transition on behalf of `actor`
    ///
    /// Returns the updated record on success. Failure leaves the record
    /// exactly as it was: no status write, no history entry, no message.
    pub async fn request_transition(
        &self,
        id: BarterId,
        requested: BarterStatus,
        actor: UserId,
    ) -> Result<BarterRecord, ExchangeError> {
        let guard = self.locks.acquire(id, self.lock_timeout).await?;

        let record = self.get(id).await?;

        let role = record
            .role_of(actor)
            .ok_or(ExchangeError::Forbidden(actor))?;

        let plan = status::plan_transition(record.status, requested, role)
            .map_err(|denial| ExchangeError::InvalidTransition(denial.to_string()))?;

        // Talent transfer is the commit point: if it fails, the whole
        // transition fails and the barter stays in its prior state.
        if plan.transfer_talents && record.kind.involves_talents() {
            self.ledger
                .transfer(record.initiator, record.recipient, record.talent_amount, id)
                .await?;
        }

        let now = chrono::Utc::now().timestamp_millis();
        let change = StatusChange {
            status: requested,
            actor,
            at: now,
        };
        let message = ThreadMessage::system(
            actor,
            format!("Status changed from {} to {}", record.status, requested),
        );

        let committed = self
            .store
            .commit_transition(id, record.status, change, message)
            .await?;
        if !committed {
            // A writer outside this lock registry got there first. With
            // the single-writer deployment this cannot happen; surface
            // it loudly as retryable contention.
            error!(
                barter_id = %id,
                expected = %record.status,
                requested = %requested,
                "Status CAS missed under lock"
            );
            return Err(ExchangeError::Busy);
        }

        self.events.emit(TransitionEvent {
            barter_id: id,
            old_status: record.status,
            new_status: requested,
            actor,
            at: now,
        });

        info!(
            barter_id = %id,
            from = %record.status,
            to = %requested,
            actor = actor,
            "Transition committed"
        );

        // Best-effort follow-up; the reconcile worker retries whatever
        // does not confirm here.
        if plan.release_listing
            && let Some(listing) = record.listing
        {
            let result = self.catalog.deactivate(listing, id).await;
            if result.is_success() {
                if let Err(e) = self.store.mark_listing_released(id).await {
                    warn!(barter_id = %id, error = %e, "Failed to mark listing released");
                }
            } else {
                warn!(
                    barter_id = %id,
                    listing = listing,
                    result = ?result,
                    "Listing deactivation unconfirmed, leaving to reconciler"
                );
            }
        }

        let updated = self.get(id).await?;

        // Terminal barters produce no further transitions; reclaim the
        // lock entry unless someone is still queued on it
        if requested.is_terminal() {
            drop(guard);
            self.locks.release(id);
        }

        Ok(updated)
    }
}
