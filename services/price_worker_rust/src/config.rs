//! Configuration for price_worker_rust

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use ticker_rust_core::clients::binance::DEFAULT_BASE_URL;
use ticker_rust_core::clients::BinanceConfig;
use ticker_rust_core::db::DbPoolConfig;
use ticker_rust_core::orchestrator::DEFAULT_RETENTION_DAYS;
use ticker_rust_core::pricing::DEFAULT_COMMISSION;
use ticker_rust_core::worker::{
    WorkerConfig, DEFAULT_MAX_RETRIES, DEFAULT_RESTART_DELAY, DEFAULT_UPDATE_INTERVAL_MS,
    MIN_UPDATE_INTERVAL_MS,
};

const DEFAULT_SYMBOL: &str = "BTCUSDT";
const MIN_RETENTION_INTERVAL_SECS: u64 = 60;
/// Roughly a century of history
const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone)]
pub struct PriceWorkerConfig {
    // Database
    pub database_url: String,
    pub db_pool: DbPoolConfig,

    // Market data
    pub binance_base_url: String,
    pub symbol: String,
    pub binance_timeout_ms: u64,

    // Pricing
    pub commission: Decimal,

    // Worker
    pub update_interval_ms: u64,
    pub max_retries: u32,

    // Retention
    pub retention_days: u32,
    pub retention_interval_secs: u64,

    // Monitoring
    pub heartbeat_interval_secs: u64,
}

impl PriceWorkerConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::from_source(|name| env::var(name).ok())?;
        config.db_pool = DbPoolConfig::from_env();
        Ok(config)
    }

    /// Build from an arbitrary variable source (the environment in production)
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

        let binance_base_url = lookup("BINANCE_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if binance_base_url.trim().is_empty() {
            return Err(anyhow!("BINANCE_BASE_URL must not be empty"));
        }

        let symbol = lookup("BINANCE_SYMBOL")
            .unwrap_or_else(|| DEFAULT_SYMBOL.to_string())
            .trim()
            .to_uppercase();
        if symbol.len() < 3 || symbol.len() > 20 {
            return Err(anyhow!("BINANCE_SYMBOL must be 3-20 characters"));
        }

        let binance_timeout_ms = parse_u64(&lookup, "BINANCE_TIMEOUT_MS", 10_000)?;
        let commission = parse_decimal(&lookup, "SERVICE_COMMISSION", DEFAULT_COMMISSION)?;
        let update_interval_ms =
            parse_u64(&lookup, "UPDATE_INTERVAL", DEFAULT_UPDATE_INTERVAL_MS)?;
        let max_retries = parse_u32(&lookup, "WORKER_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let retention_days = parse_u32(&lookup, "RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?;
        let retention_interval_secs = parse_u64(&lookup, "RETENTION_INTERVAL_SECS", 86_400)?;

        // Validate
        if binance_timeout_ms == 0 {
            return Err(anyhow!("BINANCE_TIMEOUT_MS must be > 0"));
        }
        if commission < Decimal::ZERO || commission > Decimal::ONE {
            return Err(anyhow!("SERVICE_COMMISSION must be between 0 and 1"));
        }
        if update_interval_ms < MIN_UPDATE_INTERVAL_MS {
            return Err(anyhow!(
                "UPDATE_INTERVAL must be at least {}ms",
                MIN_UPDATE_INTERVAL_MS
            ));
        }
        if max_retries == 0 {
            return Err(anyhow!("WORKER_MAX_RETRIES must be >= 1"));
        }
        if retention_days == 0 || retention_days > MAX_RETENTION_DAYS {
            return Err(anyhow!(
                "RETENTION_DAYS must be between 1 and {}",
                MAX_RETENTION_DAYS
            ));
        }
        if retention_interval_secs < MIN_RETENTION_INTERVAL_SECS {
            return Err(anyhow!(
                "RETENTION_INTERVAL_SECS must be >= {}",
                MIN_RETENTION_INTERVAL_SECS
            ));
        }

        Ok(Self {
            database_url,
            db_pool: DbPoolConfig::default(),
            binance_base_url,
            symbol,
            binance_timeout_ms,
            commission,
            update_interval_ms,
            max_retries,
            retention_days,
            retention_interval_secs,
            heartbeat_interval_secs: 60,
        })
    }

    pub fn binance_config(&self) -> BinanceConfig {
        BinanceConfig {
            base_url: self.binance_base_url.clone(),
            timeout: Duration::from_millis(self.binance_timeout_ms),
            ..Default::default()
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            update_interval_ms: self.update_interval_ms,
            max_retries: self.max_retries,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

/// Parse a variable as u32 with default fallback
fn parse_u32<F>(lookup: &F, var_name: &str, default: u32) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid u32", var_name)),
        None => Ok(default),
    }
}

/// Parse a variable as u64 with default fallback
fn parse_u64<F>(lookup: &F, var_name: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        None => Ok(default),
    }
}

/// Parse a variable as a decimal with default fallback
fn parse_decimal<F>(lookup: &F, var_name: &str, default: Decimal) -> Result<Decimal>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(val) => Decimal::from_str(val.trim())
            .map_err(|_| anyhow!("{} must be a valid decimal", var_name)),
        None => Ok(default),
    }
}
