//! Listing Reconcile Worker
//!
//! A completed barter must eventually see its linked listing
//! deactivated, but the catalog lives in a different store than the
//! barter record, so the deactivation is a retryable follow-up rather
//! than part of the commit. This worker scans for completed barters
//! whose listing release is still unconfirmed and retries it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::adapters::ListingCatalog;
use super::error::ExchangeError;
use super::store::BarterStore;
use crate::config::ReconcilerConfig;

pub struct ReconcileWorker {
    store: Arc<dyn BarterStore>,
    catalog: Arc<dyn ListingCatalog>,
    config: ReconcilerConfig,
}

impl ReconcileWorker {
    pub fn new(
        store: Arc<dyn BarterStore>,
        catalog: Arc<dyn ListingCatalog>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Run the reconcile loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval_secs,
            stale_threshold_secs = self.config.stale_threshold_secs,
            "Starting listing reconcile worker"
        );

        loop {
            if let Err(e) = self.scan_and_reconcile().await {
                error!(error = %e, "Reconcile scan failed");
            }

            tokio::time::sleep(Duration::from_secs(self.config.scan_interval_secs)).await;
        }
    }

    /// Run a single scan cycle; returns how many listings were released
    pub async fn scan_and_reconcile(&self) -> Result<usize, ExchangeError> {
        let stale = self
            .store
            .find_unreleased(
                Duration::from_secs(self.config.stale_threshold_secs),
                self.config.batch_size,
            )
            .await?;

        if stale.is_empty() {
            debug!("No unreleased listings found");
            return Ok(0);
        }

        info!(count = stale.len(), "Found unreleased listings to reconcile");

        let mut released = 0;
        for record in &stale {
            // find_unreleased only returns listing-linked records
            let Some(listing) = record.listing else {
                continue;
            };

            let result = self.catalog.deactivate(listing, record.barter_id).await;
            if result.is_success() {
                self.store.mark_listing_released(record.barter_id).await?;
                released += 1;
                info!(
                    barter_id = %record.barter_id,
                    listing = listing,
                    "Listing released on retry"
                );
            } else {
                // Failed or Pending: try again next scan
                warn!(
                    barter_id = %record.barter_id,
                    listing = listing,
                    result = ?result,
                    "Listing deactivation still unconfirmed"
                );
            }
        }

        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::adapters::MemoryCatalog;
    use crate::exchange::status::BarterStatus;
    use crate::exchange::store::MemoryBarterStore;
    use crate::exchange::types::{BarterId, BarterKind, BarterRecord, NewBarter};

    fn config() -> ReconcilerConfig {
        ReconcilerConfig {
            scan_interval_secs: 1,
            stale_threshold_secs: 0,
            batch_size: 100,
        }
    }

    async fn completed_record(store: &MemoryBarterStore, listing: u64) -> BarterId {
        let mut record = BarterRecord::new(
            BarterId::new(),
            &NewBarter {
                initiator: 1,
                recipient: 2,
                listing: Some(listing),
                kind: BarterKind::Talent,
                talent_amount: 10,
            },
        );
        record.status = BarterStatus::Completed;
        record.updated_at = chrono::Utc::now().timestamp_millis() - 5_000;
        store.insert(&record).await.unwrap();
        record.barter_id
    }

    #[tokio::test]
    async fn releases_stale_listings_once_the_catalog_recovers() {
        let store = Arc::new(MemoryBarterStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.add_listing(7);
        let id = completed_record(&store, 7).await;

        let worker = ReconcileWorker::new(store.clone(), catalog.clone(), config());

        // Catalog down: nothing released, record stays pending
        catalog.set_fail_deactivate(true);
        assert_eq!(worker.scan_and_reconcile().await.unwrap(), 0);
        assert!(!store.get(id).await.unwrap().unwrap().listing_released);

        // Catalog back: released and marked
        catalog.set_fail_deactivate(false);
        assert_eq!(worker.scan_and_reconcile().await.unwrap(), 1);
        assert!(store.get(id).await.unwrap().unwrap().listing_released);
        assert_eq!(catalog.is_active(7).await, Some(false));

        // Idempotent: next scan finds nothing
        assert_eq!(worker.scan_and_reconcile().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pending_results_are_retried_not_marked() {
        let store = Arc::new(MemoryBarterStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.add_listing(8);
        let id = completed_record(&store, 8).await;

        let worker = ReconcileWorker::new(store.clone(), catalog.clone(), config());

        catalog.set_pending_deactivate(true);
        assert_eq!(worker.scan_and_reconcile().await.unwrap(), 0);
        assert!(!store.get(id).await.unwrap().unwrap().listing_released);

        catalog.set_pending_deactivate(false);
        assert_eq!(worker.scan_and_reconcile().await.unwrap(), 1);
    }
}
