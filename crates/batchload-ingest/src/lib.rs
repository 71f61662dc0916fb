//! Batchload Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Exactly-once loading of CSV price files into PostgreSQL with running
//! count/sum/min/max statistics.
//!
//! - [`parser`]: raw CSV row to typed [`model::Record`] or a rejection
//! - [`stats`]: the aggregate and how a batch folds into it
//! - [`store`]: the [`store::IngestStore`] seam and its PostgreSQL implementation
//! - [`ingestor`]: one file, microbatch by microbatch
//! - [`coordinator`]: discovery, ordering and the run loop
//!
//! # Example
//!
//! ```no_run
//! use batchload_ingest::{config::Config, coordinator::{RunCoordinator, RunMode}, db, store::PgStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let store = PgStore::new(db::create_pool(&config.database).await?);
//!     store.bootstrap().await?;
//!
//!     let summary = RunCoordinator::new(&store, &config.ingest)
//!         .run(RunMode::Sources)
//!         .await?;
//!     println!("{}", summary.final_stats);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod ingestor;
pub mod model;
pub mod parser;
pub mod stats;
pub mod store;

pub use error::{IngestError, IngestResult};
