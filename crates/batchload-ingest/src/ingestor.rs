//! Single-file ingestion
//!
//! A file is either skipped (ledger hit) or streamed row by row: rejected rows
//! are logged and dropped, accepted rows are flushed in microbatches, and the
//! ledger entry is written only once every batch has committed.

use chrono::Utc;
use csv::{ByteRecord, ReaderBuilder, Trim};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{IngestError, IngestResult};
use crate::model::Record;
use crate::parser::{RawRow, RowParser, RowRejection};
use crate::store::IngestStore;

/// Column that must be present in every input header
pub const PRICE_COLUMN: &str = "price";

/// Per-file counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Data rows seen, header excluded
    pub rows_read: u64,
    pub rows_accepted: u64,
    pub rows_rejected: u64,
    /// Accepted rows that were new to the store
    pub rows_inserted: u64,
    /// Accepted rows already stored by an earlier, interrupted attempt
    pub rows_duplicate: u64,
    pub batches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Ledger already had the file; nothing was read
    Skipped,
    Logged(FileReport),
}

pub struct FileIngestor<'a, S: IngestStore + ?Sized> {
    store: &'a S,
    parser: RowParser,
    microbatch_size: usize,
}

impl<'a, S: IngestStore + ?Sized> FileIngestor<'a, S> {
    pub fn new(store: &'a S, parser: RowParser, microbatch_size: usize) -> Self {
        Self {
            store,
            parser,
            microbatch_size: microbatch_size.max(1),
        }
    }

    pub fn microbatch_size(&self) -> usize {
        self.microbatch_size
    }

    /// Ingest `path` unless the ledger already lists its file name.
    pub async fn ingest(&self, path: &Path) -> IngestResult<FileOutcome> {
        let file_name = file_name_of(path);

        if self.store.is_ingested(&file_name).await? {
            info!(file = %file_name, "Already ingested, skipping");
            return Ok(FileOutcome::Skipped);
        }

        info!(file = %file_name, "Ingesting");
        let report = self.load(path, &file_name).await?;

        self.store
            .log_ingestion(&file_name, report.rows_accepted, Utc::now())
            .await?;

        info!(
            file = %file_name,
            rows = report.rows_accepted,
            rejected = report.rows_rejected,
            inserted = report.rows_inserted,
            duplicates = report.rows_duplicate,
            batches = report.batches,
            "File ingested"
        );

        Ok(FileOutcome::Logged(report))
    }

    async fn load(&self, path: &Path, file_name: &str) -> IngestResult<FileReport> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)
            .map_err(|source| IngestError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let headers = reader
            .byte_headers()
            .map_err(|source| IngestError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .clone();

        if !headers.iter().any(|h| h == PRICE_COLUMN.as_bytes()) {
            return Err(IngestError::MissingColumn {
                file: file_name.to_string(),
                column: PRICE_COLUMN.to_string(),
            });
        }

        let mut report = FileReport::default();
        let mut batch: Vec<Record> = Vec::with_capacity(self.microbatch_size);
        let mut raw = ByteRecord::new();

        loop {
            let row = match reader.read_byte_record(&mut raw) {
                Ok(true) => {
                    report.rows_read += 1;
                    RawRow::from_record(&raw, &headers).map_err(RowRejection::from)
                }
                Ok(false) => break,
                Err(err) if err.is_io_error() => {
                    return Err(IngestError::Read {
                        path: path.to_path_buf(),
                        source: err,
                    });
                }
                Err(err) => {
                    report.rows_read += 1;
                    Err(RowRejection::from(err))
                }
            };

            let source_row = report.rows_read as i64;
            match row.and_then(|fields| self.parser.parse(&fields, file_name, source_row)) {
                Ok(record) => {
                    report.rows_accepted += 1;
                    batch.push(record);
                }
                Err(reason) => {
                    report.rows_rejected += 1;
                    warn!(file = %file_name, row = source_row, %reason, "Row rejected");
                }
            }

            if batch.len() >= self.microbatch_size {
                self.flush(file_name, &mut batch, &mut report).await?;
            }
        }

        if !batch.is_empty() {
            self.flush(file_name, &mut batch, &mut report).await?;
        }

        Ok(report)
    }

    async fn flush(
        &self,
        file_name: &str,
        batch: &mut Vec<Record>,
        report: &mut FileReport,
    ) -> IngestResult<()> {
        let number = report.batches + 1;

        let receipt = self
            .store
            .flush(batch.as_slice())
            .await
            .map_err(|source| IngestError::Flush {
                file: file_name.to_string(),
                batch: number,
                source,
            })?;

        debug!(
            file = %file_name,
            batch = number,
            rows = batch.len(),
            inserted = receipt.inserted,
            "Microbatch flushed"
        );

        report.batches = number;
        report.rows_inserted += receipt.inserted;
        report.rows_duplicate += receipt.duplicates;
        batch.clear();

        Ok(())
    }
}

/// Ledger key for `path`: the bare file name
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
