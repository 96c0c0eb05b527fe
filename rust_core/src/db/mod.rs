//! Price persistence.
//!
//! This module provides:
//! - [`PriceStore`]: the storage seam used by the orchestrator
//! - [`PgPriceStore`]: PostgreSQL implementation on a shared `PgPool`
//! - [`InMemoryPriceStore`]: process-local implementation for tests and dry runs
//! - Connection pool creation with consistent timeouts
//! - Idempotent bootstrap of the `prices` table and its indexes

pub mod health;
pub mod memory;
pub mod prices;
pub mod schema;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::env;
use std::time::Duration;

pub use memory::InMemoryPriceStore;
pub use prices::{PgPriceStore, PriceStore};

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct DbPoolConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Timeout for acquiring a connection
    pub acquire_timeout: Duration,
    /// How long idle connections are kept alive
    pub idle_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
}

impl Default for DbPoolConfig {
    fn default() -> Self {
        // One writer (the worker) plus a handful of concurrent readers
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),  // 5 minutes
            max_lifetime: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl DbPoolConfig {
    /// Create config from environment variables with fallback to provided defaults
    pub fn from_env_with_defaults(defaults: Self) -> Self {
        Self {
            max_connections: env::var("DB_POOL_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            min_connections: env::var("DB_POOL_MIN_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_connections),
            acquire_timeout: env::var("DB_POOL_ACQUIRE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            idle_timeout: env::var("DB_POOL_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            max_lifetime: env::var("DB_POOL_MAX_LIFETIME_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_lifetime),
        }
    }

    pub fn from_env() -> Self {
        Self::from_env_with_defaults(Self::default())
    }
}

/// Create a database connection pool with the given configuration.
///
/// # Example
/// ```ignore
/// let pool = create_pool(&database_url, &DbPoolConfig::from_env()).await?;
/// ```
pub async fn create_pool(database_url: &str, config: &DbPoolConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(database_url)
        .await
        .context("Failed to create database connection pool")?;

    tracing::info!(
        "Database pool created: max={}, min={}, acquire_timeout={}s",
        config.max_connections,
        config.min_connections,
        config.acquire_timeout.as_secs()
    );

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DbPoolConfig::default();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert!(config.min_connections <= config.max_connections);
    }

    #[test]
    fn test_from_env_falls_back_to_defaults() {
        let defaults = DbPoolConfig {
            max_connections: 7,
            ..Default::default()
        };
        // DB_POOL_* variables are not set in the test environment
        let config = DbPoolConfig::from_env_with_defaults(defaults);
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.max_lifetime, Duration::from_secs(1800));
    }
}
