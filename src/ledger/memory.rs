//! In-memory ledger
//!
//! Per-user `tokio::sync::Mutex` balances inside a `DashMap`. A transfer
//! takes both user locks in ascending user-id order, so concurrent
//! transfers over disjoint pairs never block each other and opposite
//! transfers over the same pair cannot deadlock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use super::{JournalWriter, Ledger, LedgerError, TransferReceipt};
use crate::balance::TalentBalance;
use crate::core_types::{Talents, UserId};
use crate::exchange::types::BarterId;

pub struct MemoryLedger {
    balances: DashMap<UserId, Arc<Mutex<TalentBalance>>>,
    lock_timeout: Duration,
    journal: Option<Arc<JournalWriter>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            lock_timeout: Duration::from_millis(2_000),
            journal: None,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_journal(mut self, journal: Arc<JournalWriter>) -> Self {
        self.journal = Some(journal);
        self
    }

    fn handle(&self, user: UserId) -> Result<Arc<Mutex<TalentBalance>>, LedgerError> {
        self.balances
            .get(&user)
            .map(|entry| entry.value().clone())
            .ok_or(LedgerError::UnknownAccount(user))
    }

    async fn lock<'a>(
        &self,
        handle: &'a Mutex<TalentBalance>,
    ) -> Result<MutexGuard<'a, TalentBalance>, LedgerError> {
        tokio::time::timeout(self.lock_timeout, handle.lock())
            .await
            .map_err(|_| LedgerError::Busy)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn open_account(&self, user: UserId, initial: Talents) -> Result<(), LedgerError> {
        self.balances
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(TalentBalance::with_talents(initial))));
        Ok(())
    }

    async fn balance_of(&self, user: UserId) -> Result<Talents, LedgerError> {
        let handle = self.handle(user)?;
        let guard = self.lock(&handle).await?;
        Ok(guard.talents())
    }

    async fn transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: Talents,
        barter_id: BarterId,
    ) -> Result<TransferReceipt, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if from == to {
            return Err(LedgerError::SameAccount);
        }

        let from_handle = self.handle(from)?;
        let to_handle = self.handle(to)?;

        // Ascending-id lock order keeps concurrent opposite transfers
        // over the same pair deadlock-free.
        let (mut from_guard, mut to_guard) = if from < to {
            let a = self.lock(&from_handle).await?;
            let b = self.lock(&to_handle).await?;
            (a, b)
        } else {
            let b = self.lock(&to_handle).await?;
            let a = self.lock(&from_handle).await?;
            (a, b)
        };

        // Insufficient-funds decided here, under both locks
        if !from_guard.can_debit(amount) {
            return Err(LedgerError::InsufficientBalance {
                user: from,
                available: from_guard.talents(),
                required: amount,
            });
        }
        if to_guard.talents().checked_add(amount).is_none() {
            return Err(LedgerError::Storage(format!(
                "credit overflow for user {to}"
            )));
        }

        // Both sides validated - neither call below can fail
        from_guard
            .debit(amount)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        to_guard
            .credit(amount)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let receipt = TransferReceipt {
            barter_id,
            from,
            to,
            amount,
            from_after: from_guard.talents(),
            to_after: to_guard.talents(),
            at: chrono::Utc::now().timestamp_millis(),
        };

        // Journal while still holding both locks so entry order matches
        // commit order. A journal write failure must not undo the
        // committed balances.
        if let Some(journal) = &self.journal
            && let Err(e) = journal.write_entry(&receipt)
        {
            warn!(barter_id = %barter_id, error = %e, "Ledger journal write failed");
        }

        info!(
            barter_id = %barter_id,
            from = from,
            to = to,
            amount = amount,
            from_after = receipt.from_after,
            to_after = receipt.to_after,
            "Talent transfer committed"
        );

        Ok(receipt)
    }
}
