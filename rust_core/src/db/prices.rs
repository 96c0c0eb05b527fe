//! Price record database operations
//!
//! Provides the [`PriceStore`] trait and its PostgreSQL implementation over
//! the `prices` table.

use super::health::check_pool_health;
use crate::error::PriceResult;
use crate::models::{NewPriceRecord, PriceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};

/// Persistent storage for price records of a symbol.
///
/// Reads order newest first: `timestamp DESC`, ties broken by `id DESC`.
/// Every insert is a single atomic row write, so readers never observe a
/// partial record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Validate and persist a record, assigning id and store timestamps
    async fn insert(&self, record: NewPriceRecord) -> PriceResult<PriceRecord>;

    /// Most recent record for `symbol`, if any
    async fn latest(&self, symbol: &str) -> PriceResult<Option<PriceRecord>>;

    /// Up to `limit` most recent records for `symbol`, newest first
    async fn history(&self, symbol: &str, limit: u32) -> PriceResult<Vec<PriceRecord>>;

    /// Delete records for `symbol` computed before `cutoff`; returns rows removed
    async fn delete_older_than(&self, symbol: &str, cutoff: DateTime<Utc>) -> PriceResult<u64>;

    /// Connectivity probe for health reporting. Never fails.
    async fn is_healthy(&self) -> bool;
}

const SELECT_COLUMNS: &str = "id, symbol, bid_price, ask_price, mid_price, \
     original_bid_price, original_ask_price, commission, timestamp, created_at, updated_at";

/// [`PriceStore`] backed by the PostgreSQL `prices` table
#[derive(Clone)]
pub struct PgPriceStore {
    pool: PgPool,
}

impl PgPriceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PriceStore for PgPriceStore {
    async fn insert(&self, record: NewPriceRecord) -> PriceResult<PriceRecord> {
        record.validate()?;

        let query = format!(
            r#"
            INSERT INTO prices (
                symbol, bid_price, ask_price, mid_price,
                original_bid_price, original_ask_price, commission, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SELECT_COLUMNS
        );

        let stored = sqlx::query_as::<_, PriceRecord>(&query)
            .bind(&record.symbol)
            .bind(record.bid_price)
            .bind(record.ask_price)
            .bind(record.mid_price)
            .bind(record.original_bid_price)
            .bind(record.original_ask_price)
            .bind(record.commission)
            .bind(record.timestamp)
            .fetch_one(&self.pool)
            .await?;

        debug!(
            "Inserted {} price #{}: mid {}",
            stored.symbol, stored.id, stored.mid_price
        );

        Ok(stored)
    }

    async fn latest(&self, symbol: &str) -> PriceResult<Option<PriceRecord>> {
        let query = format!(
            r#"
            SELECT {}
            FROM prices
            WHERE symbol = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        );

        let record = sqlx::query_as::<_, PriceRecord>(&query)
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn history(&self, symbol: &str, limit: u32) -> PriceResult<Vec<PriceRecord>> {
        let query = format!(
            r#"
            SELECT {}
            FROM prices
            WHERE symbol = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
            SELECT_COLUMNS
        );

        let records = sqlx::query_as::<_, PriceRecord>(&query)
            .bind(symbol)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn delete_older_than(&self, symbol: &str, cutoff: DateTime<Utc>) -> PriceResult<u64> {
        let result = sqlx::query("DELETE FROM prices WHERE symbol = $1 AND timestamp < $2")
            .bind(symbol)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn is_healthy(&self) -> bool {
        match check_pool_health(&self.pool).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Price store health check failed: {}", e);
                false
            }
        }
    }
}
