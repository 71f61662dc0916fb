//! Configuration management

use batchload_common::{env_or, env_parse, EnvError};
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::parser::{RowParser, TimestampParser, DEFAULT_TIMESTAMP_FORMATS};

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database host.
pub const DEFAULT_DB_HOST: &str = "localhost";

/// Default database port.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default database name.
pub const DEFAULT_DB_NAME: &str = "db_batch";

/// Default database user.
pub const DEFAULT_DB_USER: &str = "postgres";

/// Default database password for local development.
pub const DEFAULT_DB_PASSWORD: &str = "postgres";

/// Default maximum database connections in the pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Default connection timeout in seconds.
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default directory scanned for input files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default file name prefix of the regular source files.
pub const DEFAULT_SOURCE_PREFIX: &str = "2012-";

/// Default name of the validation file.
pub const DEFAULT_VALIDATION_FILE: &str = "validation.csv";

/// Default rows per flush.
pub const DEFAULT_MICROBATCH_SIZE: usize = 100;

/// Upper bound on rows per flush (5 bind parameters per row, 65535 per statement).
pub const MAX_MICROBATCH_SIZE: usize = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Invalid DATABASE_URL: {0}")]
    DatabaseUrl(#[source] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ingest: IngestSettings,
}

/// Database connection settings
///
/// `url` wins over the individual parts when set.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Where input files live and how they are read
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub data_dir: PathBuf,
    pub source_prefix: String,
    pub validation_file: String,
    pub microbatch_size: usize,
    pub timestamp_formats: Vec<String>,
}

impl Config {
    /// Load `.env` (if present) and read the environment.
    ///
    /// Not validated here: callers apply command-line overrides first and then
    /// call [`Config::validate`].
    pub fn load() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            ingest: IngestSettings::from_env()?,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "DB_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }

        let size = self.ingest.microbatch_size;
        if size == 0 || size > MAX_MICROBATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "microbatch size must be between 1 and {MAX_MICROBATCH_SIZE}, got {size}"
            )));
        }

        if self.ingest.validation_file.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "validation file name cannot be empty".to_string(),
            ));
        }

        if self.ingest.timestamp_formats.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one timestamp format is required".to_string(),
            ));
        }

        // DATABASE_URL must parse
        self.database.connect_options()?;

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            host: env_or("DB_HOST", DEFAULT_DB_HOST),
            port: env_parse("DB_PORT", DEFAULT_DB_PORT)?,
            name: env_or("DB_NAME", DEFAULT_DB_NAME),
            user: env_or("DB_USER", DEFAULT_DB_USER),
            password: env_or("DB_PASSWORD", DEFAULT_DB_PASSWORD),
            max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            connect_timeout_secs: env_parse(
                "DB_CONNECT_TIMEOUT",
                DEFAULT_DB_CONNECT_TIMEOUT_SECS,
            )?,
        })
    }

    pub fn connect_options(&self) -> ConfigResult<PgConnectOptions> {
        match &self.url {
            Some(url) => PgConnectOptions::from_str(url).map_err(ConfigError::DatabaseUrl),
            None => Ok(PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .database(&self.name)
                .username(&self.user)
                .password(&self.password)),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            name: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: DEFAULT_DB_PASSWORD.to_string(),
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DB_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl IngestSettings {
    pub fn from_env() -> ConfigResult<Self> {
        let timestamp_formats = match std::env::var("BATCHLOAD_TIMESTAMP_FORMATS") {
            Ok(raw) if !raw.trim().is_empty() => split_formats(&raw),
            _ => default_formats(),
        };

        Ok(Self {
            data_dir: PathBuf::from(env_or("BATCHLOAD_DATA_DIR", DEFAULT_DATA_DIR)),
            source_prefix: env_or("BATCHLOAD_SOURCE_PREFIX", DEFAULT_SOURCE_PREFIX),
            validation_file: env_or("BATCHLOAD_VALIDATION_FILE", DEFAULT_VALIDATION_FILE),
            microbatch_size: env_parse("BATCHLOAD_MICROBATCH_SIZE", DEFAULT_MICROBATCH_SIZE)?,
            timestamp_formats,
        })
    }

    pub fn row_parser(&self) -> RowParser {
        RowParser::new(TimestampParser::new(self.timestamp_formats.iter().cloned()))
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            source_prefix: DEFAULT_SOURCE_PREFIX.to_string(),
            validation_file: DEFAULT_VALIDATION_FILE.to_string(),
            microbatch_size: DEFAULT_MICROBATCH_SIZE,
            timestamp_formats: default_formats(),
        }
    }
}

fn default_formats() -> Vec<String> {
    DEFAULT_TIMESTAMP_FORMATS
        .iter()
        .map(|f| f.to_string())
        .collect()
}

fn split_formats(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}
