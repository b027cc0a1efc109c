//! PostgreSQL ledger
//!
//! Balances live in `talent_balances_tb`; a transfer is one sql
//! transaction that locks both rows in ascending user-id order, checks
//! funds under the locks, and applies debit + credit together.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{Ledger, LedgerError, TransferReceipt};
use crate::core_types::{Talents, UserId};
use crate::exchange::types::BarterId;

/// Table DDL, applied by [`PgLedger::ensure_schema`]
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS talent_balances_tb (
    user_id  BIGINT PRIMARY KEY,
    talents  BIGINT NOT NULL CHECK (talents >= 0),
    version  BIGINT NOT NULL DEFAULT 0
)
"#;

pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the balances table if it does not exist
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

/// Map row-lock timeouts (55P03) to the retryable `Busy` class
fn map_pg_err(e: sqlx::Error) -> LedgerError {
    if let Some(db) = e.as_database_error()
        && db.code().as_deref() == Some("55P03")
    {
        return LedgerError::Busy;
    }
    LedgerError::Storage(e.to_string())
}

#[async_trait]
impl Ledger for PgLedger {
    async fn open_account(&self, user: UserId, initial: Talents) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO talent_balances_tb (user_id, talents)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user as i64)
        .bind(initial as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn balance_of(&self, user: UserId) -> Result<Talents, LedgerError> {
        let talents: Option<i64> =
            sqlx::query_scalar("SELECT talents FROM talent_balances_tb WHERE user_id = $1")
                .bind(user as i64)
                .fetch_optional(&self.pool)
                .await?;

        talents
            .map(|t| t as Talents)
            .ok_or(LedgerError::UnknownAccount(user))
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

        let mut tx = self.pool.begin().await?;

        // Bounded wait on the row locks; 55P03 surfaces as Busy
        sqlx::query("SET LOCAL lock_timeout = '2s'")
            .execute(&mut *tx)
            .await?;

        // Lock both rows in ascending user-id order (deadlock-free),
        // then decide insufficient-funds under the locks.
        let rows = sqlx::query(
            r#"
            SELECT user_id, talents FROM talent_balances_tb
            WHERE user_id = ANY($1)
            ORDER BY user_id
            FOR UPDATE
            "#,
        )
        .bind(vec![from as i64, to as i64])
        .fetch_all(&mut *tx)
        .await
        .map_err(map_pg_err)?;

        let mut from_before: Option<i64> = None;
        let mut to_before: Option<i64> = None;
        for row in &rows {
            let user: i64 = row.get("user_id");
            let talents: i64 = row.get("talents");
            if user == from as i64 {
                from_before = Some(talents);
            } else if user == to as i64 {
                to_before = Some(talents);
            }
        }
        let from_before = from_before.ok_or(LedgerError::UnknownAccount(from))?;
        let to_before = to_before.ok_or(LedgerError::UnknownAccount(to))?;

        if (from_before as Talents) < amount {
            // Transaction drops here, releasing the locks with no effect
            return Err(LedgerError::InsufficientBalance {
                user: from,
                available: from_before as Talents,
                required: amount,
            });
        }

        sqlx::query(
            r#"
            UPDATE talent_balances_tb
            SET talents = talents - $1, version = version + 1
            WHERE user_id = $2
            "#,
        )
        .bind(amount as i64)
        .bind(from as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE talent_balances_tb
            SET talents = talents + $1, version = version + 1
            WHERE user_id = $2
            "#,
        )
        .bind(amount as i64)
        .bind(to as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let receipt = TransferReceipt {
            barter_id,
            from,
            to,
            amount,
            from_after: from_before as Talents - amount,
            to_after: to_before as Talents + amount,
            at: chrono::Utc::now().timestamp_millis(),
        };

        tracing::info!(
            barter_id = %barter_id,
            from = from,
            to = to,
            amount = amount,
            "Talent transfer committed (pg)"
        );

        Ok(receipt)
    }
}
