//! File and run level errors

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Anything that stops a file (and therefore the run)
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{file} has no '{column}' column")]
    MissingColumn { file: String, column: String },

    #[error("Batch {batch} of {file} was not committed: {source}")]
    Flush {
        file: String,
        batch: u64,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to list {}: {source}", path.display())]
    Discover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type IngestResult<T> = Result<T, IngestError>;
