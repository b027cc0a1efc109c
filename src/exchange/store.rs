//! Barter Record Storage
//!
//! All status updates go through CAS (Compare-And-Swap) commits: the
//! status write, the history append and the system message land
//! together or not at all, and only when the stored status still
//! matches what the caller planned against.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::error::ExchangeError;
use super::status::{BarterStatus, PartyRole};
use super::types::{BarterId, BarterRecord, Rating, StatusChange, ThreadMessage};

#[async_trait]
pub trait BarterStore: Send + Sync {
    /// Persist a freshly proposed record
    async fn insert(&self, record: &BarterRecord) -> Result<(), ExchangeError>;

    async fn get(&self, id: BarterId) -> Result<Option<BarterRecord>, ExchangeError>;

    /// Atomically commit one transition: set `change.status`, append the
    /// history entry and the system message - but only if the stored
    /// status still equals `expected`.
    ///
    /// Returns false when the CAS missed (another writer got there
    /// first); nothing is written in that case.
    async fn commit_transition(
        &self,
        id: BarterId,
        expected: BarterStatus,
        change: StatusChange,
        message: ThreadMessage,
    ) -> Result<bool, ExchangeError>;

    /// Store a rating into the role's slot if it is still empty,
    /// appending the system message with it. Returns false when the
    /// slot was already taken.
    async fn set_rating(
        &self,
        id: BarterId,
        role: PartyRole,
        rating: Rating,
        message: ThreadMessage,
    ) -> Result<bool, ExchangeError>;

    /// Confirm that the linked listing has been deactivated
    async fn mark_listing_released(&self, id: BarterId) -> Result<(), ExchangeError>;

    /// Completed, listing-linked records whose deactivation is still
    /// unconfirmed after `stale_threshold`. Used by the reconcile
    /// worker.
    async fn find_unreleased(
        &self,
        stale_threshold: Duration,
        limit: usize,
    ) -> Result<Vec<BarterRecord>, ExchangeError>;
}

/// In-memory store (embedded use and tests)
#[derive(Default)]
pub struct MemoryBarterStore {
    records: DashMap<BarterId, Arc<Mutex<BarterRecord>>>,
}

impl MemoryBarterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: BarterId) -> Option<Arc<Mutex<BarterRecord>>> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl BarterStore for MemoryBarterStore {
    async fn insert(&self, record: &BarterRecord) -> Result<(), ExchangeError> {
        if self.records.contains_key(&record.barter_id) {
            return Err(ExchangeError::SystemError(format!(
                "duplicate barter id {}",
                record.barter_id
            )));
        }
        self.records
            .insert(record.barter_id, Arc::new(Mutex::new(record.clone())));
        Ok(())
    }

    async fn get(&self, id: BarterId) -> Result<Option<BarterRecord>, ExchangeError> {
        match self.handle(id) {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn commit_transition(
        &self,
        id: BarterId,
        expected: BarterStatus,
        change: StatusChange,
        message: ThreadMessage,
    ) -> Result<bool, ExchangeError> {
        let handle = self
            .handle(id)
            .ok_or_else(|| ExchangeError::NotFound(id.to_string()))?;
        let mut record = handle.lock().await;

        if record.status != expected {
            return Ok(false);
        }

        record.status = change.status;
        record.updated_at = change.at;
        record.history.push(change);
        record.messages.push(message);
        Ok(true)
    }

    async fn set_rating(
        &self,
        id: BarterId,
        role: PartyRole,
        rating: Rating,
        message: ThreadMessage,
    ) -> Result<bool, ExchangeError> {
        let handle = self
            .handle(id)
            .ok_or_else(|| ExchangeError::NotFound(id.to_string()))?;
        let mut record = handle.lock().await;

        let slot = match role {
            PartyRole::Initiator => &mut record.initiator_rating,
            PartyRole::Recipient => &mut record.recipient_rating,
        };
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(rating);
        record.updated_at = message.at;
        record.messages.push(message);
        Ok(true)
    }

    async fn mark_listing_released(&self, id: BarterId) -> Result<(), ExchangeError> {
        let handle = self
            .handle(id)
            .ok_or_else(|| ExchangeError::NotFound(id.to_string()))?;
        let mut record = handle.lock().await;
        record.listing_released = true;
        Ok(())
    }

    async fn find_unreleased(
        &self,
        stale_threshold: Duration,
        limit: usize,
    ) -> Result<Vec<BarterRecord>, ExchangeError> {
        let cutoff = chrono::Utc::now().timestamp_millis() - stale_threshold.as_millis() as i64;

        // Collect handles first - locking while iterating the map would
        // hold shard guards across await points
        let handles: Vec<_> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut found = Vec::new();
        for handle in handles {
            let record = handle.lock().await;
            if record.status == BarterStatus::Completed
                && record.listing.is_some()
                && !record.listing_released
                && record.updated_at <= cutoff
            {
                found.push(record.clone());
            }
        }

        found.sort_by_key(|r| r.updated_at);
        found.truncate(limit);
        Ok(found)
    }
}
