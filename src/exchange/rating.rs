//! Rating Aggregator
//!
//! Post-completion ratings: each party may rate the other at most once
//! per barter. A stored rating updates the counterparty's running
//! average through the user directory.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::adapters::UserDirectory;
use super::coordinator::LockRegistry;
use super::error::ExchangeError;
use super::status::BarterStatus;
use super::store::BarterStore;
use super::types::{BarterId, Rating, ThreadMessage};
use crate::core_types::UserId;

/// Result of a stored rating
#[derive(Debug, Clone, PartialEq)]
pub struct RatingOutcome {
    /// The party that received the rating
    pub rated_user: UserId,
    /// Their recomputed running average (one decimal place), `None`
    /// when the directory did not confirm the update. The rating slots
    /// on the record are the source of truth; the directory average is
    /// derived data the caller may refetch.
    pub new_average: Option<f64>,
}

pub struct RatingService {
    store: Arc<dyn BarterStore>,
    directory: Arc<dyn UserDirectory>,
    locks: Arc<LockRegistry>,
    lock_timeout: Duration,
}

impl RatingService {
    pub fn new(
        store: Arc<dyn BarterStore>,
        directory: Arc<dyn UserDirectory>,
        locks: Arc<LockRegistry>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            locks,
            lock_timeout,
        }
    }

    /// Submit `actor`'s rating of their counterparty
    ///
    /// Idempotency: a second attempt by the same actor on the same
    /// barter fails with `AlreadyRated` and leaves the average alone.
    pub async fn submit(
        &self,
        id: BarterId,
        actor: UserId,
        score: u8,
        comment: impl Into<String>,
    ) -> Result<RatingOutcome, ExchangeError> {
        if !(1..=5).contains(&score) {
            return Err(ExchangeError::InvalidScore(score));
        }

        // Same lock the coordinator uses, so rating and transition
        // attempts on one barter serialize together
        let guard = self.locks.acquire(id, self.lock_timeout).await?;

        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ExchangeError::NotFound(id.to_string()))?;

        let role = record
            .role_of(actor)
            .ok_or(ExchangeError::Forbidden(actor))?;

        if record.status != BarterStatus::Completed {
            return Err(ExchangeError::NotCompleted);
        }
        if record.rating_of(role).is_some() {
            return Err(ExchangeError::AlreadyRated(actor));
        }

        let rated_user = record.counterparty(role);
        if self.directory.get_user(rated_user).await.is_none() {
            return Err(ExchangeError::UserNotFound(rated_user));
        }

        let rating = Rating {
            score,
            comment: comment.into(),
            at: chrono::Utc::now().timestamp_millis(),
        };
        let message = ThreadMessage::system(
            actor,
            format!("{} rated the exchange {}/5", role, score),
        );

        let stored = self.store.set_rating(id, role, rating, message).await?;
        if !stored {
            return Err(ExchangeError::AlreadyRated(actor));
        }

        // The slot CAS is the commit point; an unconfirmed directory
        // update must not turn a stored rating into a caller-visible
        // failure
        let new_average = self.directory.record_rating(rated_user, score).await;
        if new_average.is_none() {
            warn!(
                barter_id = %id,
                rated_user = rated_user,
                "Directory did not confirm the rating update"
            );
        }

        info!(
            barter_id = %id,
            actor = actor,
            rated_user = rated_user,
            score = score,
            new_average = ?new_average,
            "Rating stored"
        );

        drop(guard);
        self.locks.release(id);

        Ok(RatingOutcome {
            rated_user,
            new_average,
        })
    }
}
