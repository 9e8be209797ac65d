//! Batch Outcome Registry Module
//!
//! This module implements a SQLite registry for executed batches and their
//! per-request outcomes, plus requests that were dropped as dead letters.
//! Pending requests are never stored here; the registry only sees a request
//! once it has left the queue for good.
//!
//! # Storage
//! - `batches`: one row per executed batch (counts, tx hash, timestamp)
//! - `batch_results`: one row per request (signer, nonce, success, payload)
//! - `dead_letters`: one row per dropped request

use crate::{report::ResultReporter, Batch, ExecutionOutcome, PendingEntry};
use async_trait::async_trait;
use chrono::Utc;
use ethers::utils::to_checksum;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, warn};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS batches (
        batch_id INTEGER PRIMARY KEY,
        request_count INTEGER NOT NULL,
        success_count INTEGER NOT NULL,
        tx_hash TEXT,
        dispatched_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS batch_results (
        batch_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        signer TEXT NOT NULL,
        target TEXT NOT NULL,
        nonce TEXT NOT NULL,
        success BOOLEAN NOT NULL,
        result TEXT NOT NULL,
        PRIMARY KEY (batch_id, position)
    )",
    "CREATE TABLE IF NOT EXISTS dead_letters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        batch_id INTEGER NOT NULL,
        signer TEXT NOT NULL,
        nonce TEXT NOT NULL,
        attempts INTEGER NOT NULL,
        reason TEXT NOT NULL,
        dropped_at INTEGER NOT NULL
    )",
];

/// Summary row of an executed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BatchRecord {
    pub batch_id: i64,
    pub request_count: i64,
    pub success_count: i64,
    pub tx_hash: Option<String>,
    pub dispatched_at: i64,
}

/// Outcome of one request inside an executed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RequestRecord {
    pub batch_id: i64,
    pub position: i64,
    pub signer: String,
    pub target: String,
    /// Decimal
    pub nonce: String,
    pub success: bool,
    /// Hex-encoded return data or revert payload
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DeadLetterRecord {
    pub batch_id: i64,
    pub signer: String,
    pub nonce: String,
    pub attempts: i64,
    pub reason: String,
    pub dropped_at: i64,
}

/// Batch outcome registry
///
/// Stores batch outcomes in SQLite for querying and auditing. Cloning shares
/// the connection pool.
#[derive(Clone)]
pub struct BatchRegistry {
    pool: SqlitePool,
}

impl BatchRegistry {
    /// Opens (and if needed creates) the registry database
    ///
    /// # Arguments
    /// * `url` - SQLite URL, e.g. `sqlite://relayer.db?mode=rwc` or `sqlite::memory:`
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        // every pooled connection to :memory: would open its own empty database
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let registry = Self { pool };
        registry.migrate().await?;
        Ok(registry)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Highest batch id already recorded, so a restarted relayer continues the sequence
    pub async fn last_batch_id(&self) -> Result<u64, sqlx::Error> {
        let last: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(id) FROM (
                SELECT MAX(batch_id) AS id FROM batches
                UNION ALL
                SELECT MAX(batch_id) AS id FROM dead_letters
            )",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(last.unwrap_or(0).max(0) as u64)
    }

    /// Store an executed batch and its per-request outcomes atomically
    pub async fn store(&self, batch: &Batch, outcome: &ExecutionOutcome) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO batches (batch_id, request_count, success_count, tx_hash, dispatched_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(batch.batch_id as i64)
        .bind(batch.len() as i64)
        .bind(outcome.success_count() as i64)
        .bind(outcome.tx_hash.map(|hash| format!("{:?}", hash)))
        .bind(batch.created_at.timestamp())
        .execute(&mut *tx)
        .await?;

        for (position, (entry, (success, result))) in batch.entries.iter().zip(outcome.iter()).enumerate() {
            let request = &entry.signed.request;
            sqlx::query(
                "INSERT INTO batch_results (batch_id, position, signer, target, nonce, success, result)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(batch.batch_id as i64)
            .bind(position as i64)
            .bind(to_checksum(&request.from, None))
            .bind(to_checksum(&request.to, None))
            .bind(request.nonce.to_string())
            .bind(success)
            .bind(result.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Stored batch #{} in registry", batch.batch_id);
        Ok(())
    }

    pub async fn store_dead_letters(
        &self,
        batch_id: u64,
        entries: &[PendingEntry],
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        let dropped_at = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let request = &entry.signed.request;
            sqlx::query(
                "INSERT INTO dead_letters (batch_id, signer, nonce, attempts, reason, dropped_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(batch_id as i64)
            .bind(to_checksum(&request.from, None))
            .bind(request.nonce.to_string())
            .bind(entry.attempts as i64)
            .bind(reason)
            .bind(dropped_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    pub async fn batch(&self, batch_id: u64) -> Result<Option<BatchRecord>, sqlx::Error> {
        sqlx::query_as::<_, BatchRecord>(
            "SELECT batch_id, request_count, success_count, tx_hash, dispatched_at
             FROM batches WHERE batch_id = ?",
        )
        .bind(batch_id as i64)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn results(&self, batch_id: u64) -> Result<Vec<RequestRecord>, sqlx::Error> {
        sqlx::query_as::<_, RequestRecord>(
            "SELECT batch_id, position, signer, target, nonce, success, result
             FROM batch_results WHERE batch_id = ? ORDER BY position",
        )
        .bind(batch_id as i64)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetterRecord>, sqlx::Error> {
        sqlx::query_as::<_, DeadLetterRecord>(
            "SELECT batch_id, signer, nonce, attempts, reason, dropped_at
             FROM dead_letters ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[async_trait]
impl ResultReporter for BatchRegistry {
    async fn report(&self, batch: &Batch, outcome: &ExecutionOutcome) {
        if let Err(e) = self.store(batch, outcome).await {
            warn!("Failed to record batch #{}: {}", batch.batch_id, e);
        }
    }

    async fn report_dead_letters(&self, batch_id: u64, entries: &[PendingEntry], reason: &str) {
        if let Err(e) = self.store_dead_letters(batch_id, entries, reason).await {
            warn!("Failed to record {} dead letters of batch #{}: {}", entries.len(), batch_id, e);
        }
    }
}
