//! Common test utilities for batchload integration tests
//!
//! - [`MemoryStore`]: an [`IngestStore`] kept in a mutex, with the same
//!   row-identity and all-or-nothing flush behaviour as the PostgreSQL store
//! - [`FailingStore`]: wraps another store and fails one chosen flush
//! - CSV fixture helpers on top of `tempfile`
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{settings, write_csv, MemoryStore};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let dir = tempfile::tempdir().unwrap();
//!     write_csv(dir.path(), "2012-1-1.csv", &["2012-01-01,10.00,1"]);
//!     let store = MemoryStore::default();
//!     let settings = settings(dir.path(), 100);
//!     // ...
//! }
//! ```

#![allow(dead_code)]

use async_trait::async_trait;
use batchload_ingest::config::IngestSettings;
use batchload_ingest::model::{LedgerEntry, Record};
use batchload_ingest::stats::AggregateState;
use batchload_ingest::store::{FlushReceipt, IngestStore, StoreError, StoreResult};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

pub const HEADER: &str = "timestamp,price,user_id";

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryState {
    pub records: Vec<Record>,
    pub keys: HashSet<(String, i64)>,
    pub ledger: HashMap<String, LedgerEntry>,
    pub stats: AggregateState,
    pub flushes: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn with_state<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    pub fn record_count(&self) -> usize {
        self.with_state(|s| s.records.len())
    }

    pub fn ledger_rows(&self, file_name: &str) -> Option<i64> {
        self.with_state(|s| s.ledger.get(file_name).map(|e| e.rows_loaded))
    }

    pub fn flush_count(&self) -> u64 {
        self.with_state(|s| s.flushes)
    }

    /// Source files of the stored records, in insertion order, deduplicated
    pub fn files_in_order(&self) -> Vec<String> {
        self.with_state(|s| {
            let mut files: Vec<String> = Vec::new();
            for record in &s.records {
                if files.last() != Some(&record.source_file) {
                    files.push(record.source_file.clone());
                }
            }
            files
        })
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn flush(&self, batch: &[Record]) -> StoreResult<FlushReceipt> {
        if batch.is_empty() {
            return Err(StoreError::EmptyBatch);
        }

        let mut state = self.state.lock().unwrap();
        state.flushes += 1;

        let mut fresh = Vec::new();
        let mut seen = HashSet::new();
        for record in batch {
            let key = (record.source_file.clone(), record.source_row);
            if !state.keys.contains(&key) && seen.insert(key) {
                fresh.push(record.clone());
            }
        }

        state.stats = state.stats.combine(fresh.iter().map(|r| &r.price));
        for record in &fresh {
            state
                .keys
                .insert((record.source_file.clone(), record.source_row));
        }
        let inserted = fresh.len() as u64;
        state.records.extend(fresh);

        Ok(FlushReceipt {
            inserted,
            duplicates: batch.len() as u64 - inserted,
        })
    }

    async fn log_ingestion(
        &self,
        file_name: &str,
        rows_loaded: u64,
        loaded_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.state.lock().unwrap().ledger.insert(
            file_name.to_string(),
            LedgerEntry {
                file_name: file_name.to_string(),
                rows_loaded: rows_loaded as i64,
                loaded_at,
            },
        );
        Ok(())
    }

    async fn ledger_entry(&self, file_name: &str) -> StoreResult<Option<LedgerEntry>> {
        Ok(self.state.lock().unwrap().ledger.get(file_name).cloned())
    }

    async fn stats(&self) -> StoreResult<AggregateState> {
        Ok(self.state.lock().unwrap().stats.clone())
    }

    async fn reset(&self) -> StoreResult<()> {
        *self.state.lock().unwrap() = MemoryState::default();
        Ok(())
    }
}

// ============================================================================
// Failure injection
// ============================================================================

/// Fails the `fail_on`-th flush call (1-based) once, without touching the
/// inner store. Later calls pass through.
#[derive(Debug)]
pub struct FailingStore<S> {
    inner: S,
    fail_on: u64,
    calls: AtomicU64,
    armed: AtomicBool,
}

impl<S> FailingStore<S> {
    pub fn new(inner: S, fail_on: u64) -> Self {
        Self {
            inner,
            fail_on,
            calls: AtomicU64::new(0),
            armed: AtomicBool::new(true),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: IngestStore> IngestStore for FailingStore<S> {
    async fn flush(&self, batch: &[Record]) -> StoreResult<FlushReceipt> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on && self.armed.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        self.inner.flush(batch).await
    }

    async fn log_ingestion(
        &self,
        file_name: &str,
        rows_loaded: u64,
        loaded_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.log_ingestion(file_name, rows_loaded, loaded_at).await
    }

    async fn ledger_entry(&self, file_name: &str) -> StoreResult<Option<LedgerEntry>> {
        self.inner.ledger_entry(file_name).await
    }

    async fn stats(&self) -> StoreResult<AggregateState> {
        self.inner.stats().await
    }

    async fn reset(&self) -> StoreResult<()> {
        self.inner.reset().await
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Write `HEADER` plus `rows` to `dir/name`.
pub fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
    write_raw(dir, name, HEADER, rows)
}

pub fn write_raw(dir: &Path, name: &str, header: &str, rows: &[&str]) -> PathBuf {
    let mut contents = String::from(header);
    contents.push('\n');
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }

    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write fixture");
    path
}

pub fn settings(dir: &Path, microbatch_size: usize) -> IngestSettings {
    IngestSettings {
        data_dir: dir.to_path_buf(),
        microbatch_size,
        ..IngestSettings::default()
    }
}

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).expect("Invalid decimal literal")
}
