//! Persistent store seam
//!
//! The ingestor and coordinator only talk to an [`IngestStore`]. The
//! production implementation is [`PgStore`]; tests plug in an in-memory one.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{LedgerEntry, Record};
use crate::stats::AggregateState;

pub use postgres::{PgStore, STATS_NAME};

/// Storage errors. Any of these is fatal to the file being ingested.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The aggregate row was not there to update
    #[error("Stats row '{0}' is missing; run the migrations or reset the tables")]
    MissingStatsRow(String),

    #[error("Refusing to flush an empty batch")]
    EmptyBatch,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What one committed flush did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReceipt {
    pub inserted: u64,
    /// Rows whose `(source_file, source_row)` was already stored
    pub duplicates: u64,
}

#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Whether the ledger holds an entry for `file_name`
    async fn is_ingested(&self, file_name: &str) -> StoreResult<bool> {
        Ok(self.ledger_entry(file_name).await?.is_some())
    }

    /// Insert `batch` and fold the prices of newly inserted rows into the
    /// aggregate, atomically.
    async fn flush(&self, batch: &[Record]) -> StoreResult<FlushReceipt>;

    /// Create or overwrite the ledger entry for `file_name`.
    async fn log_ingestion(
        &self,
        file_name: &str,
        rows_loaded: u64,
        loaded_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn ledger_entry(&self, file_name: &str) -> StoreResult<Option<LedgerEntry>>;

    async fn stats(&self) -> StoreResult<AggregateState>;

    /// Clear records, ledger and aggregate in one step.
    async fn reset(&self) -> StoreResult<()>;
}
