//! Append-only warehouse table for normalized prop rows.
//!
//! Rows are only ever inserted. Columns can be added to an existing table but
//! never altered or dropped.

use crate::config::{Config, TableRef};
use crate::normalize::NormalizedRow;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Column name and SQL type, in row order
pub const COLUMNS: [(&str, &str); 21] = [
    ("fetch_ts_utc", "TIMESTAMPTZ"),
    ("event_id", "TEXT"),
    ("sport_key", "TEXT"),
    ("commence_time_utc", "TIMESTAMPTZ"),
    ("commence_time_local", "TIMESTAMPTZ"),
    ("home_team", "TEXT"),
    ("away_team", "TEXT"),
    ("bookmaker_key", "TEXT"),
    ("bookmaker_title", "TEXT"),
    ("bookmaker_last_update_utc", "TIMESTAMPTZ"),
    ("market_key", "TEXT"),
    ("base_market_key", "TEXT"),
    ("is_alternate", "BOOLEAN"),
    ("market_last_update_utc", "TIMESTAMPTZ"),
    ("player", "TEXT"),
    ("outcome_name", "TEXT"),
    ("outcome_side", "TEXT"),
    ("price_american", "BIGINT"),
    ("point", "DOUBLE PRECISION"),
    ("regions_requested", "TEXT"),
    ("odds_format", "TEXT"),
];

const CONNECT_RETRIES: u32 = 5;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("failed to connect to warehouse after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("warehouse query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Destination for normalized rows.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Create the target table if absent.
    async fn ensure_table(&self) -> Result<(), WarehouseError>;

    /// Append one batch; returns the number of rows written.
    async fn append(&self, rows: &[NormalizedRow]) -> Result<u64, WarehouseError>;
}

/// Postgres-backed warehouse table
pub struct PostgresWarehouse {
    pool: PgPool,
    table: TableRef,
}

impl PostgresWarehouse {
    pub async fn connect(config: &Config) -> Result<Self, WarehouseError> {
        let pool = Self::connect_with_retry(&config.database_url, CONNECT_RETRIES).await?;
        Ok(Self::from_pool(pool, config.table.clone()))
    }

    pub fn from_pool(pool: PgPool, table: TableRef) -> Self {
        Self { pool, table }
    }

    async fn connect_with_retry(url: &str, max_retries: u32) -> Result<PgPool, WarehouseError> {
        let mut attempt = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => {
                    info!("Connected to warehouse");
                    return Ok(pool);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(WarehouseError::Connect {
                            attempts: max_retries,
                            source: e,
                        });
                    }
                    warn!("Warehouse connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }
}

fn create_table_sql(table: &TableRef) -> String {
    let columns = COLUMNS
        .iter()
        .map(|(name, ty)| format!("\"{}\" {}", name, ty))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table.qualified(), columns)
}

/// Field addition only; never retypes or drops an existing column
fn add_column_sql(table: &TableRef, name: &str, ty: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS \"{}\" {}",
        table.qualified(),
        name,
        ty
    )
}

fn insert_sql(table: &TableRef) -> String {
    let names = COLUMNS
        .iter()
        .map(|(name, _)| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(", ");
    let params = (1..=COLUMNS.len())
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", table.qualified(), names, params)
}

#[async_trait]
impl RowSink for PostgresWarehouse {
    async fn ensure_table(&self) -> Result<(), WarehouseError> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(self.table.qualified())
            .fetch_one(&self.pool)
            .await?;

        if !exists {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.table.dataset()))
                .execute(&self.pool)
                .await?;
            sqlx::query(&create_table_sql(&self.table))
                .execute(&self.pool)
                .await?;
            info!("Created table (no partitioning): {}", self.table);
            return Ok(());
        }

        info!("Table exists: {}", self.table);

        // Field addition only; existing columns are left as they are
        for (name, ty) in COLUMNS {
            sqlx::query(&add_column_sql(&self.table, name, ty))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn append(&self, rows: &[NormalizedRow]) -> Result<u64, WarehouseError> {
        if rows.is_empty() {
            warn!("No rows to upload.");
            return Ok(0);
        }

        let sql = insert_sql(&self.table);
        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(&sql)
                .bind(row.fetch_ts_utc)
                .bind(&row.event_id)
                .bind(&row.sport_key)
                .bind(row.commence_time_utc)
                .bind(row.commence_time_local)
                .bind(&row.home_team)
                .bind(&row.away_team)
                .bind(&row.bookmaker_key)
                .bind(&row.bookmaker_title)
                .bind(row.bookmaker_last_update_utc)
                .bind(&row.market_key)
                .bind(&row.base_market_key)
                .bind(row.is_alternate)
                .bind(row.market_last_update_utc)
                .bind(&row.player)
                .bind(&row.outcome_name)
                .bind(row.outcome_side.as_str())
                .bind(row.price_american)
                .bind(row.point)
                .bind(&row.regions_requested)
                .bind(&row.odds_format)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!("Uploaded {} rows -> {}", rows.len(), self.table);
        Ok(rows.len() as u64)
    }
}
