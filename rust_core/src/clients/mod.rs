//! Market data feed clients.
//!
//! [`MarketDataClient`] is the seam between the orchestrator and a quote
//! source. Implementations never retry; retry policy belongs to the worker.

pub mod binance;

use crate::error::PriceResult;
use crate::models::Quote;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use binance::{BinanceClient, BinanceConfig};

/// Feed availability as observed by the last call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProviderStatus {
    /// Last call succeeded
    #[default]
    Healthy,
    /// Feed signalled throttling
    RateLimited,
    /// Feed answered with an error or an invalid payload
    Error,
    /// Feed could not be reached (timeout, DNS, refused connection)
    Unavailable,
}

/// Source of best bid/ask quotes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Display name used in logs (e.g. "Binance")
    fn provider_name(&self) -> &str;

    /// Status after the most recent call
    fn status(&self) -> ProviderStatus;

    /// Fetch the current best bid/ask for `symbol`.
    ///
    /// A successful return is already validated: both prices parse to
    /// positive decimals and bid < ask.
    async fn fetch_quote(&self, symbol: &str) -> PriceResult<Quote>;

    /// Lightweight liveness probe. Never fails; reports false instead.
    async fn test_connectivity(&self) -> bool;
}
