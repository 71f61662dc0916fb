//! Rows as they are stored
//!
//! Both types are owned by the persistent store; the engine only builds
//! [`Record`]s and reads [`LedgerEntry`]s back.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

/// One accepted observation (maps to `bt.transactions`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// `None` when the source row had no timestamp
    pub timestamp: Option<NaiveDateTime>,
    pub price: BigDecimal,
    pub user_id: Option<i64>,
    /// File name (not path) the row came from
    pub source_file: String,
    /// 1-based data row number inside `source_file`, header excluded.
    ///
    /// Together with `source_file` this is the row's identity: re-flushing the
    /// same row is a no-op.
    pub source_row: i64,
}

/// Idempotency ledger entry (maps to `bt.ingestion_log`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub file_name: String,
    pub rows_loaded: i64,
    pub loaded_at: DateTime<Utc>,
}
