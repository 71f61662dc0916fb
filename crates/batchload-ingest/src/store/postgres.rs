//! PostgreSQL store over the `bt` schema

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};

use super::{FlushReceipt, IngestStore, StoreError, StoreResult};
use crate::model::{LedgerEntry, Record};
use crate::stats::{AggregateState, BatchSummary};

/// Name of the single aggregate row
pub const STATS_NAME: &str = "global";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations and make sure the aggregate row exists.
    pub async fn bootstrap(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;

        let mut tx = self.pool.begin().await?;
        seed_stats_row(&mut tx).await?;
        tx.commit().await?;

        info!("Schema bt is ready");
        Ok(())
    }

    // ========================================================================
    // Flush helpers
    // ========================================================================

    /// Insert the batch, returning the prices of the rows that were new.
    async fn insert_records(
        tx: &mut Transaction<'_, Postgres>,
        batch: &[Record],
    ) -> StoreResult<Vec<BigDecimal>> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO bt.transactions (
                timestamp,
                price,
                user_id,
                source_file,
                source_row
            )
            "#,
        );

        query_builder.push_values(batch, |mut b, record| {
            b.push_bind(record.timestamp)
                .push_bind(&record.price)
                .push_bind(record.user_id)
                .push_bind(&record.source_file)
                .push_bind(record.source_row);
        });

        query_builder.push(
            r#"
            ON CONFLICT (source_file, source_row) DO NOTHING
            RETURNING price
            "#,
        );

        let inserted = query_builder
            .build_query_scalar::<BigDecimal>()
            .fetch_all(&mut **tx)
            .await?;

        Ok(inserted)
    }

    /// Relative update; `LEAST`/`GREATEST` skip a NULL bound.
    async fn apply_summary(
        tx: &mut Transaction<'_, Postgres>,
        summary: &BatchSummary,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bt.stats
            SET cnt = cnt + $1,
                ssum = ssum + $2,
                smin = LEAST(smin, $3),
                smax = GREATEST(smax, $4)
            WHERE name = $5
            "#,
        )
        .bind(summary.count)
        .bind(&summary.sum)
        .bind(&summary.min)
        .bind(&summary.max)
        .bind(STATS_NAME)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingStatsRow(STATS_NAME.to_string()));
        }

        Ok(())
    }
}

async fn seed_stats_row(tx: &mut Transaction<'_, Postgres>) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO bt.stats (name, cnt, ssum, smin, smax)
        VALUES ($1, 0, 0, NULL, NULL)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(STATS_NAME)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl IngestStore for PgStore {
    async fn flush(&self, batch: &[Record]) -> StoreResult<FlushReceipt> {
        if batch.is_empty() {
            return Err(StoreError::EmptyBatch);
        }

        let mut tx = self.pool.begin().await?;

        let inserted = Self::insert_records(&mut tx, batch).await?;
        if let Some(summary) = BatchSummary::from_values(&inserted) {
            Self::apply_summary(&mut tx, &summary).await?;
        }

        tx.commit().await?;

        let receipt = FlushReceipt {
            inserted: inserted.len() as u64,
            duplicates: (batch.len() - inserted.len()) as u64,
        };
        debug!(
            rows = batch.len(),
            inserted = receipt.inserted,
            duplicates = receipt.duplicates,
            "Batch committed"
        );

        Ok(receipt)
    }

    async fn log_ingestion(
        &self,
        file_name: &str,
        rows_loaded: u64,
        loaded_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bt.ingestion_log (file_name, rows_loaded, loaded_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (file_name)
            DO UPDATE SET
                rows_loaded = EXCLUDED.rows_loaded,
                loaded_at = EXCLUDED.loaded_at
            "#,
        )
        .bind(file_name)
        .bind(i64::try_from(rows_loaded).unwrap_or(i64::MAX))
        .bind(loaded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ledger_entry(&self, file_name: &str) -> StoreResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            "SELECT file_name, rows_loaded, loaded_at FROM bt.ingestion_log WHERE file_name = $1",
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn stats(&self) -> StoreResult<AggregateState> {
        let row = sqlx::query_as::<_, (i64, BigDecimal, Option<BigDecimal>, Option<BigDecimal>)>(
            "SELECT cnt, ssum, smin, smax FROM bt.stats WHERE name = $1",
        )
        .bind(STATS_NAME)
        .fetch_optional(&self.pool)
        .await?;

        let (count, sum, min, max) =
            row.ok_or_else(|| StoreError::MissingStatsRow(STATS_NAME.to_string()))?;

        Ok(AggregateState {
            count,
            sum,
            min,
            max,
        })
    }

    async fn reset(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("TRUNCATE bt.transactions, bt.ingestion_log, bt.stats RESTART IDENTITY")
            .execute(&mut *tx)
            .await?;
        seed_stats_row(&mut tx).await?;

        tx.commit().await?;

        info!("Truncated bt.transactions, bt.ingestion_log and bt.stats");
        Ok(())
    }
}
