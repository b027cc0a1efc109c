//! End-to-end barter lifecycle tests over the public API
//!
//! Wires the in-memory stack the way the demo binary does and drives
//! whole negotiations through the coordinator.

use std::sync::Arc;
use std::time::Duration;

use barter_core::config::ReconcilerConfig;
use barter_core::exchange::{
    BarterCoordinator, BarterId, BarterKind, BarterStatus, BroadcastSink, ExchangeError,
    MemoryBarterStore, MemoryCatalog, MemoryDirectory, NewBarter, RatingService, ReconcileWorker,
};
use barter_core::exchange::UserDirectory;
use barter_core::ledger::{Ledger, MemoryLedger};

struct Stack {
    coordinator: Arc<BarterCoordinator>,
    ratings: RatingService,
    ledger: Arc<MemoryLedger>,
    directory: Arc<MemoryDirectory>,
    catalog: Arc<MemoryCatalog>,
    events: Arc<BroadcastSink>,
    store: Arc<MemoryBarterStore>,
}

async fn stack(balances: &[(u64, u64)], listings: &[u64]) -> Stack {
    let store = Arc::new(MemoryBarterStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let directory = Arc::new(MemoryDirectory::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let events = Arc::new(BroadcastSink::new(256));

    for (user, talents) in balances {
        directory.add_user(*user);
        ledger.open_account(*user, *talents).await.unwrap();
    }
    for listing in listings {
        catalog.add_listing(*listing);
    }

    let coordinator = Arc::new(BarterCoordinator::new(
        store.clone(),
        ledger.clone(),
        directory.clone(),
        catalog.clone(),
        events.clone(),
        Duration::from_millis(500),
    ));
    let ratings = RatingService::new(
        store.clone(),
        directory.clone(),
        coordinator.locks(),
        Duration::from_millis(500),
    );

    Stack {
        coordinator,
        ratings,
        ledger,
        directory,
        catalog,
        events,
        store,
    }
}

async fn propose(s: &Stack, amount: u64, listing: Option<u64>) -> BarterId {
    s.coordinator
        .propose(NewBarter {
            initiator: 1,
            recipient: 2,
            listing,
            kind: BarterKind::Talent,
            talent_amount: amount,
        })
        .await
        .unwrap()
        .barter_id
}

#[tokio::test]
async fn example_scenario_from_proposal_to_completion() {
    // talentAmount=15, initiator balance 20, recipient balance 5
    let s = stack(&[(1, 20), (2, 5)], &[7]).await;
    let id = propose(&s, 15, Some(7)).await;

    s.coordinator
        .request_transition(id, BarterStatus::Accepted, 2)
        .await
        .unwrap();
    let record = s
        .coordinator
        .request_transition(id, BarterStatus::Completed, 1)
        .await
        .unwrap();

    assert_eq!(record.status, BarterStatus::Completed);
    assert_eq!(s.ledger.balance_of(1).await.unwrap(), 5);
    assert_eq!(s.ledger.balance_of(2).await.unwrap(), 20);

    // Proposed seed entry plus the two transitions
    let statuses: Vec<_> = record.history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![
            BarterStatus::Proposed,
            BarterStatus::Accepted,
            BarterStatus::Completed
        ]
    );
    // History timestamps reflect commit order
    assert!(record.history.windows(2).all(|w| w[0].at <= w[1].at));

    assert!(record.listing_released);
    assert_eq!(s.catalog.is_active(7).await, Some(false));
    assert_eq!(s.catalog.completed_by(7).await, Some(id));
}

#[tokio::test]
async fn underfunded_completion_fails_cleanly() {
    // talentAmount=50, initiator balance 10
    let s = stack(&[(1, 10), (2, 0)], &[]).await;
    let id = propose(&s, 50, None).await;

    s.coordinator
        .request_transition(id, BarterStatus::Accepted, 2)
        .await
        .unwrap();
    let err = s
        .coordinator
        .request_transition(id, BarterStatus::Completed, 2)
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::InsufficientBalance { .. }));

    let record = s.coordinator.get(id).await.unwrap();
    assert_eq!(record.status, BarterStatus::Accepted);
    assert_eq!(record.history.len(), 2);
    assert_eq!(s.ledger.balance_of(1).await.unwrap(), 10);
    assert_eq!(s.ledger.balance_of(2).await.unwrap(), 0);

    // A funded initiator makes the same move succeed
    let s2 = stack(&[(1, 60), (2, 0)], &[]).await;
    let id2 = propose(&s2, 50, None).await;
    s2.coordinator
        .request_transition(id2, BarterStatus::Accepted, 2)
        .await
        .unwrap();
    let record = s2
        .coordinator
        .request_transition(id2, BarterStatus::Completed, 2)
        .await
        .unwrap();
    assert_eq!(record.status, BarterStatus::Completed);
    assert_eq!(s2.ledger.balance_of(1).await.unwrap(), 10);
    assert_eq!(s2.ledger.balance_of(2).await.unwrap(), 50);
}

#[tokio::test]
async fn rejection_and_cancellation_paths() {
    let s = stack(&[(1, 20), (2, 5)], &[]).await;

    let id = propose(&s, 5, None).await;
    let record = s
        .coordinator
        .request_transition(id, BarterStatus::Rejected, 2)
        .await
        .unwrap();
    assert_eq!(record.status, BarterStatus::Rejected);

    let id = propose(&s, 5, None).await;
    let record = s
        .coordinator
        .request_transition(id, BarterStatus::Cancelled, 1)
        .await
        .unwrap();
    assert_eq!(record.status, BarterStatus::Cancelled);

    // No talents moved on either path
    assert_eq!(s.ledger.balance_of(1).await.unwrap(), 20);
    assert_eq!(s.ledger.balance_of(2).await.unwrap(), 5);
}

#[tokio::test]
async fn combined_barter_moves_talents_on_completion() {
    let s = stack(&[(1, 20), (2, 5)], &[7]).await;

    // Goods plus a talent sweetener still needs a positive amount
    let err = s
        .coordinator
        .propose(NewBarter {
            initiator: 1,
            recipient: 2,
            listing: Some(7),
            kind: BarterKind::Combined,
            talent_amount: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::InvalidAmount));

    let id = s
        .coordinator
        .propose(NewBarter {
            initiator: 1,
            recipient: 2,
            listing: Some(7),
            kind: BarterKind::Combined,
            talent_amount: 8,
        })
        .await
        .unwrap()
        .barter_id;

    s.coordinator
        .request_transition(id, BarterStatus::Accepted, 2)
        .await
        .unwrap();
    let record = s
        .coordinator
        .request_transition(id, BarterStatus::Completed, 2)
        .await
        .unwrap();

    assert_eq!(record.status, BarterStatus::Completed);
    assert!(record.listing_released);
    assert_eq!(s.ledger.balance_of(1).await.unwrap(), 12);
    assert_eq!(s.ledger.balance_of(2).await.unwrap(), 13);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn talent_conservation_across_concurrent_completions() {
    let s = stack(&[(1, 100), (2, 100)], &[]).await;

    // Ten accepted barters, completed concurrently from both sides
    let mut ids = Vec::new();
    for _ in 0..10 {
        let id = propose(&s, 9, None).await;
        s.coordinator
            .request_transition(id, BarterStatus::Accepted, 2)
            .await
            .unwrap();
        ids.push(id);
    }

    let mut tasks = Vec::new();
    for (i, id) in ids.into_iter().enumerate() {
        let c = s.coordinator.clone();
        let actor = if i % 2 == 0 { 1 } else { 2 };
        tasks.push(tokio::spawn(async move {
            c.request_transition(id, BarterStatus::Completed, actor).await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    let b1 = s.ledger.balance_of(1).await.unwrap();
    let b2 = s.ledger.balance_of(2).await.unwrap();
    assert_eq!(b1, 10); // 100 - 10 * 9
    assert_eq!(b2, 190);
    assert_eq!(b1 + b2, 200); // conservation law
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_transitions_admit_one_winner() {
    for _ in 0..10 {
        let s = stack(&[(1, 100), (2, 0)], &[]).await;
        let id = propose(&s, 10, None).await;
        s.coordinator
            .request_transition(id, BarterStatus::Accepted, 2)
            .await
            .unwrap();

        let c1 = s.coordinator.clone();
        let c2 = s.coordinator.clone();
        let a = tokio::spawn(async move {
            c1.request_transition(id, BarterStatus::Completed, 1).await
        });
        let b = tokio::spawn(async move {
            c2.request_transition(id, BarterStatus::Cancelled, 2).await
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

        let record = s.coordinator.get(id).await.unwrap();
        match record.status {
            BarterStatus::Completed => {
                assert_eq!(s.ledger.balance_of(2).await.unwrap(), 10);
            }
            BarterStatus::Cancelled => {
                assert_eq!(s.ledger.balance_of(2).await.unwrap(), 0);
            }
            other => panic!("unexpected terminal status {other}"),
        }
        assert_eq!(record.history.len(), 3);
    }
}

#[tokio::test]
async fn events_are_emitted_per_commit_only() {
    let s = stack(&[(1, 20), (2, 5)], &[]).await;
    let mut rx = s.events.subscribe();

    let id = propose(&s, 15, None).await;
    s.coordinator
        .request_transition(id, BarterStatus::Accepted, 2)
        .await
        .unwrap();
    // Illegal move commits nothing and emits nothing
    let _ = s
        .coordinator
        .request_transition(id, BarterStatus::Rejected, 2)
        .await
        .unwrap_err();
    s.coordinator
        .request_transition(id, BarterStatus::Completed, 1)
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.new_status, BarterStatus::Accepted);
    assert_eq!(second.new_status, BarterStatus::Completed);
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn reconciler_releases_listing_after_catalog_outage() {
    let s = stack(&[(1, 20), (2, 5)], &[7]).await;
    let id = propose(&s, 15, Some(7)).await;
    s.coordinator
        .request_transition(id, BarterStatus::Accepted, 2)
        .await
        .unwrap();

    // Catalog down at completion time: barter still completes
    s.catalog.set_fail_deactivate(true);
    let record = s
        .coordinator
        .request_transition(id, BarterStatus::Completed, 1)
        .await
        .unwrap();
    assert_eq!(record.status, BarterStatus::Completed);
    assert!(!record.listing_released);
    assert_eq!(s.catalog.is_active(7).await, Some(true));

    // Catalog recovers: the worker converges
    s.catalog.set_fail_deactivate(false);
    let worker = ReconcileWorker::new(
        s.store.clone(),
        s.catalog.clone(),
        ReconcilerConfig {
            scan_interval_secs: 1,
            stale_threshold_secs: 0,
            batch_size: 10,
        },
    );
    assert_eq!(worker.scan_and_reconcile().await.unwrap(), 1);
    assert!(s.coordinator.get(id).await.unwrap().listing_released);
    assert_eq!(s.catalog.is_active(7).await, Some(false));
}

#[tokio::test]
async fn ratings_after_completion_update_profiles_once() {
    let s = stack(&[(1, 20), (2, 5)], &[]).await;
    let id = propose(&s, 15, None).await;
    s.coordinator
        .request_transition(id, BarterStatus::Accepted, 2)
        .await
        .unwrap();

    // Too early
    assert!(matches!(
        s.ratings.submit(id, 1, 5, "").await,
        Err(ExchangeError::NotCompleted)
    ));

    s.coordinator
        .request_transition(id, BarterStatus::Completed, 1)
        .await
        .unwrap();

    let outcome = s.ratings.submit(id, 1, 4, "fine").await.unwrap();
    assert_eq!(outcome.rated_user, 2);
    assert_eq!(outcome.new_average, Some(4.0));

    assert!(matches!(
        s.ratings.submit(id, 1, 5, "again").await,
        Err(ExchangeError::AlreadyRated(1))
    ));
    let profile = s.directory.get_user(2).await.unwrap();
    assert_eq!(profile.rating_count, 1);
    assert_eq!(profile.average_rating, 4.0);

    // Post-completion system message landed without a status change
    let record = s.coordinator.get(id).await.unwrap();
    assert_eq!(record.status, BarterStatus::Completed);
    assert_eq!(record.history.len(), 3);
    assert_eq!(record.messages.len(), 4);
}
