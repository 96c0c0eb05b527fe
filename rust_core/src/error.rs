//! Error taxonomy shared by the feed client, the calculator, the store and
//! the worker.
//!
//! Every failure a fetch cycle can produce is one of these variants, so the
//! worker and the serving layer only ever match on a single enum:
//! - Validation: `InvalidQuote`, `InvertedSpread`, `InvalidCommission`, `InvalidInterval`
//! - Transport: `RateLimited`, `InvalidSymbol`, `Timeout`, `Unreachable`, `UpstreamError`
//! - Storage: `Storage`

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Result alias used throughout the core crate
pub type PriceResult<T> = Result<T, PriceError>;

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    /// Quote content is missing, unparseable or non-positive
    #[error("invalid quote: {0}")]
    InvalidQuote(String),

    /// Raw bid is not strictly below raw ask
    #[error("inverted spread: bid {bid} >= ask {ask}")]
    InvertedSpread { bid: Decimal, ask: Decimal },

    #[error("invalid commission {0}: must be between 0 and 1")]
    InvalidCommission(Decimal),

    #[error("invalid update interval {0}ms: must be at least 1000ms")]
    InvalidInterval(u64),

    /// Upstream signalled throttling (HTTP 429 / 418)
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// Network, DNS or connection failure
    #[error("market data feed unreachable: {0}")]
    Unreachable(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Fieldless discriminant of [`PriceError`] for logs and status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidQuote,
    InvertedSpread,
    InvalidCommission,
    InvalidInterval,
    RateLimited,
    InvalidSymbol,
    Timeout,
    Unreachable,
    UpstreamError,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidQuote => "invalid_quote",
            Self::InvertedSpread => "inverted_spread",
            Self::InvalidCommission => "invalid_commission",
            Self::InvalidInterval => "invalid_interval",
            Self::RateLimited => "rate_limited",
            Self::InvalidSymbol => "invalid_symbol",
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::UpstreamError => "upstream_error",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PriceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuote(_) => ErrorKind::InvalidQuote,
            Self::InvertedSpread { .. } => ErrorKind::InvertedSpread,
            Self::InvalidCommission(_) => ErrorKind::InvalidCommission,
            Self::InvalidInterval(_) => ErrorKind::InvalidInterval,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::InvalidSymbol(_) => ErrorKind::InvalidSymbol,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Unreachable(_) => ErrorKind::Unreachable,
            Self::UpstreamError(_) => ErrorKind::UpstreamError,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Caller's fault; never retried automatically
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuote(_)
                | Self::InvertedSpread { .. }
                | Self::InvalidCommission(_)
                | Self::InvalidInterval(_)
        )
    }

    /// Failure talking to the market data feed
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::InvalidSymbol(_)
                | Self::Timeout(_)
                | Self::Unreachable(_)
                | Self::UpstreamError(_)
        )
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<sqlx::Error> for PriceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
