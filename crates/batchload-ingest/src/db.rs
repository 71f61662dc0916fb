//! Connection pool set-up

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::{ConfigError, DatabaseConfig};

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type DbResult<T> = Result<T, DbError>;

pub async fn create_pool(config: &DatabaseConfig) -> DbResult<PgPool> {
    let options = config.connect_options()?;

    let host = options.get_host().to_string();
    let database = options.get_database().unwrap_or_default().to_string();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(options)
        .await?;

    tracing::info!(
        host = %host,
        database = %database,
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}
