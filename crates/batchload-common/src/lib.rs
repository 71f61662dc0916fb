//! Batchload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the batchload workspace members:
//!
//! - **Logging**: `tracing` subscriber set-up driven by [`logging::LogConfig`]
//! - **Environment**: typed lookups of environment variables with defaults
//!
//! # Example
//!
//! ```no_run
//! use batchload_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod logging;

pub use env::{env_or, env_parse, EnvError};
