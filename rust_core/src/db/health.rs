//! Database connection health checks

use crate::error::PriceResult;
use sqlx::PgPool;

/// Round-trip a trivial query through the pool
pub async fn check_pool_health(pool: &PgPool) -> PriceResult<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

/// Get database pool statistics
pub fn get_pool_stats(pool: &PgPool) -> PoolStats {
    PoolStats {
        size: pool.size(),
        idle: pool.num_idle(),
    }
}

/// Database pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections in the pool
    pub size: u32,
    /// Number of idle connections
    pub idle: usize,
}

impl PoolStats {
    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle as u32)
    }
}
