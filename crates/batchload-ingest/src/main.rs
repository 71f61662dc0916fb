//! batchload - exactly-once CSV loader

use anyhow::Context;
use batchload_common::logging::{init_logging, LogConfig, LogLevel};
use batchload_ingest::config::{Config, MAX_MICROBATCH_SIZE};
use batchload_ingest::coordinator::{RunCoordinator, RunMode};
use batchload_ingest::db;
use batchload_ingest::store::{IngestStore, PgStore};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "batchload")]
#[command(author, version, about = "Load CSV price files into PostgreSQL exactly once")]
struct Cli {
    /// Rows per committed microbatch
    #[arg(
        long,
        visible_alias = "chunksize",
        value_parser = clap::value_parser!(u32).range(1..=MAX_MICROBATCH_SIZE as i64)
    )]
    microbatch_size: Option<u32>,

    /// Ingest only the validation file
    #[arg(long)]
    validation: bool,

    /// Truncate all bt tables and exit
    #[arg(long, visible_alias = "reset", conflicts_with = "validation")]
    truncate_tables: bool,

    /// Directory holding the CSV files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// File name prefix of the source files
    #[arg(long)]
    source_prefix: Option<String>,

    /// Name of the validation file inside the data directory
    #[arg(long)]
    validation_file: Option<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(size) = self.microbatch_size {
            config.ingest.microbatch_size = size as usize;
        }
        if let Some(ref dir) = self.data_dir {
            config.ingest.data_dir = dir.clone();
        }
        if let Some(ref prefix) = self.source_prefix {
            config.ingest.source_prefix = prefix.clone();
        }
        if let Some(ref file) = self.validation_file {
            config.ingest.validation_file = file.clone();
        }
    }

    fn mode(&self) -> RunMode {
        if self.validation {
            RunMode::Validation
        } else {
            RunMode::Sources
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("batchload")
        .filter_directives("sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        }
    };

    if let Err(e) = execute(&cli).await {
        error!(error = %format!("{e:#}"), "Run failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn execute(cli: &Cli) -> anyhow::Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate()?;

    let pool = db::create_pool(&config.database).await?;
    db::health_check(&pool).await?;

    let store = PgStore::new(pool);
    store.bootstrap().await?;

    if cli.truncate_tables {
        store.reset().await?;
        info!("Tables truncated");
        return Ok(());
    }

    let summary = RunCoordinator::new(&store, &config.ingest)
        .run(cli.mode())
        .await?;

    info!(stats = %summary.final_stats, "Final stats");

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary.final_stats);
    }

    Ok(())
}
