//! Run coordination: which files, in what order
//!
//! Files are processed one after another. The first file-level error ends the
//! run; files that were already logged stay logged.

use serde::Serialize;
use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::IngestSettings;
use crate::error::{IngestError, IngestResult};
use crate::ingestor::{file_name_of, FileIngestor, FileOutcome};
use crate::stats::StatsSnapshot;
use crate::store::IngestStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every source file in the data directory
    Sources,
    /// Only the validation file
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub file_name: String,
    pub outcome: FileOutcome,
    pub stats_after: StatsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub files: Vec<FileSummary>,
    pub final_stats: StatsSnapshot,
}

impl RunSummary {
    pub fn logged(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Logged(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.outcome == FileOutcome::Skipped)
            .count()
    }
}

pub struct RunCoordinator<'a, S: IngestStore + ?Sized> {
    store: &'a S,
    settings: &'a IngestSettings,
}

impl<'a, S: IngestStore + ?Sized> RunCoordinator<'a, S> {
    pub fn new(store: &'a S, settings: &'a IngestSettings) -> Self {
        Self { store, settings }
    }

    /// Files this run would process, in processing order
    pub async fn plan(&self, mode: RunMode) -> IngestResult<Vec<PathBuf>> {
        match mode {
            RunMode::Sources => {
                discover_source_files(
                    &self.settings.data_dir,
                    &self.settings.source_prefix,
                    &self.settings.validation_file,
                )
                .await
            }
            RunMode::Validation => {
                let path = self.settings.data_dir.join(&self.settings.validation_file);
                Ok(find_validation_file(path).await?.into_iter().collect())
            }
        }
    }

    pub async fn run(&self, mode: RunMode) -> IngestResult<RunSummary> {
        let files = self.plan(mode).await?;
        info!(?mode, files = files.len(), "Starting run");

        self.run_files(mode, &files).await
    }

    /// Ingest `files` in the given order.
    pub async fn run_files(&self, mode: RunMode, files: &[PathBuf]) -> IngestResult<RunSummary> {
        let ingestor = FileIngestor::new(
            self.store,
            self.settings.row_parser(),
            self.settings.microbatch_size,
        );

        let mut summaries = Vec::with_capacity(files.len());
        for path in files {
            let outcome = ingestor.ingest(path).await?;
            let stats_after = self.store.stats().await?.snapshot();

            info!(file = %file_name_of(path), stats = %stats_after, "Stats after file");

            summaries.push(FileSummary {
                file_name: file_name_of(path),
                outcome,
                stats_after,
            });
        }

        let final_stats = self.store.stats().await?.snapshot();
        let summary = RunSummary {
            mode,
            files: summaries,
            final_stats,
        };

        info!(
            logged = summary.logged(),
            skipped = summary.skipped(),
            stats = %summary.final_stats,
            "Run complete"
        );

        Ok(summary)
    }
}

// ============================================================================
// Discovery and ordering
// ============================================================================

/// Source files in `dir`, sorted by [`FileKey`].
///
/// A file qualifies when its name starts with `prefix`, ends in `.csv` (any
/// case) and is not the validation file (any case).
pub async fn discover_source_files(
    dir: &Path,
    prefix: &str,
    validation_file: &str,
) -> IngestResult<Vec<PathBuf>> {
    let discover_err = |source| IngestError::Discover {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(discover_err)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(discover_err)? {
        if !entry.file_type().await.map_err(discover_err)?.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if is_source_file(&name, prefix, validation_file) {
            files.push(entry.path());
        }
    }

    sort_source_files(&mut files);
    Ok(files)
}

/// `Some(path)` when `path` is a regular file. A missing file is not an error;
/// any other failure to stat it is.
async fn find_validation_file(path: PathBuf) -> IngestResult<Option<PathBuf>> {
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(Some(path)),
        Ok(_) => {
            warn!(path = %path.display(), "Validation path is not a file, nothing to do");
            Ok(None)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Validation file not found, nothing to do");
            Ok(None)
        }
        Err(source) => Err(IngestError::Discover { path, source }),
    }
}

fn is_source_file(name: &str, prefix: &str, validation_file: &str) -> bool {
    name.starts_with(prefix)
        && name.to_ascii_lowercase().ends_with(".csv")
        && !name.eq_ignore_ascii_case(validation_file)
}

pub fn sort_source_files(files: &mut [PathBuf]) {
    files.sort_by_cached_key(|path| FileKey::new(&file_name_of(path)));
}

/// Ordering key of a file name: the stem split on `-`, digit-only parts
/// compared as numbers.
///
/// A numeric part sorts before a text part at the same position, which keeps
/// the order total. Equal keys fall back to the full name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKey {
    parts: Vec<KeyPart>,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyPart {
    Number(String),
    Text(String),
}

impl FileKey {
    pub fn new(file_name: &str) -> Self {
        let stem = match file_name.len().checked_sub(4) {
            Some(cut) if file_name.is_char_boundary(cut)
                && file_name[cut..].eq_ignore_ascii_case(".csv") =>
            {
                &file_name[..cut]
            }
            _ => file_name,
        };

        let parts = stem
            .split('-')
            .map(|part| {
                if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                    KeyPart::Number(part.to_string())
                } else {
                    KeyPart::Text(part.to_string())
                }
            })
            .collect();

        Self {
            parts,
            name: file_name.to_string(),
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Number(a), KeyPart::Number(b)) => {
                let a_digits = a.trim_start_matches('0');
                let b_digits = b.trim_start_matches('0');
                a_digits
                    .len()
                    .cmp(&b_digits.len())
                    .then_with(|| a_digits.cmp(b_digits))
                    .then_with(|| a.cmp(b))
            }
            (KeyPart::Number(_), KeyPart::Text(_)) => Ordering::Less,
            (KeyPart::Text(_), KeyPart::Number(_)) => Ordering::Greater,
            (KeyPart::Text(a), KeyPart::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts
            .cmp(&other.parts)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for FileKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
