//! barter-core demo harness
//!
//! Wires the in-memory stack and walks one barter through its full
//! lifecycle: propose, accept, complete (talents move, listing
//! released), then mutual ratings. Useful for eyeballing the audit
//! trail and the emitted events.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use barter_core::config::AppConfig;
use barter_core::exchange::{
    BarterCoordinator, BarterKind, BarterStatus, BroadcastSink, MemoryBarterStore, MemoryCatalog,
    MemoryDirectory, NewBarter, RatingService, ReconcileWorker,
};
use barter_core::ledger::{JournalWriter, Ledger, MemoryLedger};
use barter_core::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("BARTER_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = if Path::new(&format!("config/{env}.yaml")).exists() {
        AppConfig::load(&env)
    } else {
        AppConfig::default()
    };
    let _guard = init_logging(&config);

    // Wire the in-memory stack
    let store = Arc::new(MemoryBarterStore::new());
    let mut ledger = MemoryLedger::new();
    if let Some(path) = &config.ledger_journal {
        ledger = ledger.with_journal(Arc::new(JournalWriter::new(path)?));
    }
    let ledger = Arc::new(ledger);
    let directory = Arc::new(MemoryDirectory::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let events = Arc::new(BroadcastSink::new(64));

    let coordinator = Arc::new(BarterCoordinator::new(
        store.clone(),
        ledger.clone(),
        directory.clone(),
        catalog.clone(),
        events.clone(),
        config.coordinator.lock_timeout(),
    ));
    let ratings = RatingService::new(
        store.clone(),
        directory.clone(),
        coordinator.locks(),
        config.coordinator.lock_timeout(),
    );
    let reconciler = ReconcileWorker::new(store, catalog.clone(), config.reconciler.clone());

    // Seed two users and a listing
    for user in [1, 2] {
        directory.add_user(user);
    }
    ledger.open_account(1, 20).await?;
    ledger.open_account(2, 5).await?;
    catalog.add_listing(7);

    let mut rx = events.subscribe();

    // Propose -> accept -> complete
    let record = coordinator
        .propose(NewBarter {
            initiator: 1,
            recipient: 2,
            listing: Some(7),
            kind: BarterKind::Talent,
            talent_amount: 15,
        })
        .await?;
    let id = record.barter_id;

    coordinator
        .request_transition(id, BarterStatus::Accepted, 2)
        .await?;
    let record = coordinator
        .request_transition(id, BarterStatus::Completed, 1)
        .await?;

    while let Ok(event) = rx.try_recv() {
        info!(
            barter_id = %event.barter_id,
            from = %event.old_status,
            to = %event.new_status,
            actor = event.actor,
            "Event received"
        );
    }

    info!(
        status = %record.status,
        initiator_balance = ledger.balance_of(1).await?,
        recipient_balance = ledger.balance_of(2).await?,
        listing_active = ?catalog.is_active(7).await,
        history_entries = record.history.len(),
        "Barter completed"
    );

    // Mutual ratings
    let outcome = ratings.submit(id, 1, 5, "smooth exchange").await?;
    info!(rated_user = outcome.rated_user, average = ?outcome.new_average, "Rating stored");
    let outcome = ratings.submit(id, 2, 4, "would barter again").await?;
    info!(rated_user = outcome.rated_user, average = ?outcome.new_average, "Rating stored");

    // One reconcile pass (everything already released here)
    let released = reconciler.scan_and_reconcile().await?;
    info!(released = released, "Reconcile pass done");

    // Let the non-blocking appender flush
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
