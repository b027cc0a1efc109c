//! Barter Database Layer
//!
//! PostgreSQL-based persistence for barter records. All status updates
//! use atomic CAS (Compare-And-Swap) operations, and every commit
//! writes the status, the history entry and the system message inside
//! one sql transaction.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::error::ExchangeError;
use super::status::{BarterStatus, PartyRole};
use super::store::BarterStore;
use super::types::{
    BarterId, BarterKind, BarterRecord, Rating, StatusChange, ThreadMessage,
};

/// Table DDL, applied by [`PgBarterStore::ensure_schema`]
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS barters_tb (
    barter_id                 TEXT PRIMARY KEY,
    initiator                 BIGINT NOT NULL,
    recipient                 BIGINT NOT NULL,
    listing                   BIGINT,
    listing_released          BOOLEAN NOT NULL DEFAULT FALSE,
    kind                      SMALLINT NOT NULL,
    talent_amount             BIGINT NOT NULL,
    status                    SMALLINT NOT NULL,
    initiator_rating_score    SMALLINT,
    initiator_rating_comment  TEXT,
    initiator_rating_at       BIGINT,
    recipient_rating_score    SMALLINT,
    recipient_rating_comment  TEXT,
    recipient_rating_at       BIGINT,
    created_at                BIGINT NOT NULL,
    updated_at                BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS barter_history_tb (
    id        BIGSERIAL PRIMARY KEY,
    barter_id TEXT NOT NULL REFERENCES barters_tb (barter_id),
    status    SMALLINT NOT NULL,
    actor     BIGINT NOT NULL,
    at        BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS barter_messages_tb (
    id        BIGSERIAL PRIMARY KEY,
    barter_id TEXT NOT NULL REFERENCES barters_tb (barter_id),
    sender    BIGINT NOT NULL,
    body      TEXT NOT NULL,
    at        BIGINT NOT NULL,
    is_system BOOLEAN NOT NULL
);
"#;

pub struct PgBarterStore {
    pool: PgPool,
}

impl PgBarterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the barter tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), ExchangeError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn load_record(&self, id: BarterId) -> Result<Option<BarterRecord>, ExchangeError> {
        let row = sqlx::query("SELECT * FROM barters_tb WHERE barter_id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut record = row_to_record(&row)?;

        let history_rows = sqlx::query(
            "SELECT status, actor, at FROM barter_history_tb WHERE barter_id = $1 ORDER BY id",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        for h in history_rows {
            let status_id: i16 = h.get("status");
            record.history.push(StatusChange {
                status: BarterStatus::from_id(status_id).ok_or_else(|| {
                    ExchangeError::SystemError(format!("Invalid status ID: {}", status_id))
                })?,
                actor: h.get::<i64, _>("actor") as u64,
                at: h.get("at"),
            });
        }

        let message_rows = sqlx::query(
            "SELECT sender, body, at, is_system FROM barter_messages_tb \
             WHERE barter_id = $1 ORDER BY id",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        for m in message_rows {
            record.messages.push(ThreadMessage {
                sender: m.get::<i64, _>("sender") as u64,
                body: m.get("body"),
                at: m.get("at"),
                system: m.get("is_system"),
            });
        }

        Ok(Some(record))
    }
}

/// Convert a `barters_tb` row, without history/messages
fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<BarterRecord, ExchangeError> {
    let barter_id_str: String = row.get("barter_id");
    let barter_id: BarterId = barter_id_str
        .parse()
        .map_err(|_| ExchangeError::SystemError("Invalid barter_id format".to_string()))?;

    let status_id: i16 = row.get("status");
    let status = BarterStatus::from_id(status_id)
        .ok_or_else(|| ExchangeError::SystemError(format!("Invalid status ID: {}", status_id)))?;

    let kind_id: i16 = row.get("kind");
    let kind = BarterKind::from_id(kind_id)
        .ok_or_else(|| ExchangeError::SystemError(format!("Invalid kind ID: {}", kind_id)))?;

    let rating = |prefix: &str| -> Option<Rating> {
        let score: Option<i16> = row.get(format!("{prefix}_rating_score").as_str());
        score.map(|s| Rating {
            score: s as u8,
            comment: row
                .get::<Option<String>, _>(format!("{prefix}_rating_comment").as_str())
                .unwrap_or_default(),
            at: row
                .get::<Option<i64>, _>(format!("{prefix}_rating_at").as_str())
                .unwrap_or_default(),
        })
    };

    Ok(BarterRecord {
        barter_id,
        initiator: row.get::<i64, _>("initiator") as u64,
        recipient: row.get::<i64, _>("recipient") as u64,
        listing: row.get::<Option<i64>, _>("listing").map(|l| l as u64),
        listing_released: row.get("listing_released"),
        kind,
        talent_amount: row.get::<i64, _>("talent_amount") as u64,
        status,
        history: Vec::new(),
        messages: Vec::new(),
        initiator_rating: rating("initiator"),
        recipient_rating: rating("recipient"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl BarterStore for PgBarterStore {
    async fn insert(&self, record: &BarterRecord) -> Result<(), ExchangeError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO barters_tb
                (barter_id, initiator, recipient, listing, listing_released,
                 kind, talent_amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.barter_id.to_string())
        .bind(record.initiator as i64)
        .bind(record.recipient as i64)
        .bind(record.listing.map(|l| l as i64))
        .bind(record.listing_released)
        .bind(record.kind.id())
        .bind(record.talent_amount as i64)
        .bind(record.status.id())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        for change in &record.history {
            sqlx::query(
                "INSERT INTO barter_history_tb (barter_id, status, actor, at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(record.barter_id.to_string())
            .bind(change.status.id())
            .bind(change.actor as i64)
            .bind(change.at)
            .execute(&mut *tx)
            .await?;
        }
        for message in &record.messages {
            sqlx::query(
                "INSERT INTO barter_messages_tb (barter_id, sender, body, at, is_system) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(record.barter_id.to_string())
            .bind(message.sender as i64)
            .bind(&message.body)
            .bind(message.at)
            .bind(message.system)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: BarterId) -> Result<Option<BarterRecord>, ExchangeError> {
        self.load_record(id).await
    }

    async fn commit_transition(
        &self,
        id: BarterId,
        expected: BarterStatus,
        change: StatusChange,
        message: ThreadMessage,
    ) -> Result<bool, ExchangeError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE barters_tb
            SET status = $1, updated_at = $2
            WHERE barter_id = $3 AND status = $4
            "#,
        )
        .bind(change.status.id())
        .bind(change.at)
        .bind(id.to_string())
        .bind(expected.id())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // CAS missed - transaction drops with nothing written
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO barter_history_tb (barter_id, status, actor, at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id.to_string())
        .bind(change.status.id())
        .bind(change.actor as i64)
        .bind(change.at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO barter_messages_tb (barter_id, sender, body, at, is_system) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id.to_string())
        .bind(message.sender as i64)
        .bind(&message.body)
        .bind(message.at)
        .bind(message.system)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn set_rating(
        &self,
        id: BarterId,
        role: PartyRole,
        rating: Rating,
        message: ThreadMessage,
    ) -> Result<bool, ExchangeError> {
        let mut tx = self.pool.begin().await?;

        // CAS on the empty slot: the WHERE clause rejects a second write
        let sql = match role {
            PartyRole::Initiator => {
                r#"
                UPDATE barters_tb
                SET initiator_rating_score = $1, initiator_rating_comment = $2,
                    initiator_rating_at = $3, updated_at = $3
                WHERE barter_id = $4 AND initiator_rating_score IS NULL
                "#
            }
            PartyRole::Recipient => {
                r#"
                UPDATE barters_tb
                SET recipient_rating_score = $1, recipient_rating_comment = $2,
                    recipient_rating_at = $3, updated_at = $3
                WHERE barter_id = $4 AND recipient_rating_score IS NULL
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(rating.score as i16)
            .bind(&rating.comment)
            .bind(rating.at)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO barter_messages_tb (barter_id, sender, body, at, is_system) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id.to_string())
        .bind(message.sender as i64)
        .bind(&message.body)
        .bind(message.at)
        .bind(message.system)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_listing_released(&self, id: BarterId) -> Result<(), ExchangeError> {
        sqlx::query("UPDATE barters_tb SET listing_released = TRUE WHERE barter_id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_unreleased(
        &self,
        stale_threshold: Duration,
        limit: usize,
    ) -> Result<Vec<BarterRecord>, ExchangeError> {
        let cutoff = chrono::Utc::now().timestamp_millis() - stale_threshold.as_millis() as i64;

        let rows = sqlx::query(
            r#"
            SELECT barter_id FROM barters_tb
            WHERE status = $1
              AND listing IS NOT NULL
              AND NOT listing_released
              AND updated_at <= $2
            ORDER BY updated_at ASC
            LIMIT $3
            "#,
        )
        .bind(BarterStatus::Completed.id())
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id_str: String = row.get("barter_id");
            let id: BarterId = id_str
                .parse()
                .map_err(|_| ExchangeError::SystemError("Invalid barter_id format".to_string()))?;
            if let Some(record) = self.load_record(id).await? {
                records.push(record);
            }
        }

        Ok(records)
    }
}
