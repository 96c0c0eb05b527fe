//! Price data model.
//!
//! A fetch cycle moves through three shapes:
//! - [`Quote`]: raw best bid/ask strings as received from the feed
//! - [`ComputedPrice`]: commission-adjusted prices, not yet persisted
//! - [`PriceRecord`]: a stored row, id and store timestamps assigned

use crate::error::{PriceError, PriceResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Longest symbol the `prices.symbol` column accepts
pub const MAX_SYMBOL_LEN: usize = 20;

/// Raw best bid/ask pair from the market data feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    /// Best bid as sent by the feed (decimal string)
    pub raw_bid: String,
    /// Best ask as sent by the feed (decimal string)
    pub raw_ask: String,
    pub received_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, raw_bid: impl Into<String>, raw_ask: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            raw_bid: raw_bid.into(),
            raw_ask: raw_ask.into(),
            received_at: Utc::now(),
        }
    }
}

/// Commission-adjusted prices for one quote.
///
/// Carries the parsed originals and the commission that was read for this
/// computation so the persisted record never mixes two commission values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedPrice {
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub mid_price: Decimal,
    pub original_bid_price: Decimal,
    pub original_ask_price: Decimal,
    pub commission: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A price record before the store assigns its id and timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPriceRecord {
    pub symbol: String,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub mid_price: Decimal,
    pub original_bid_price: Decimal,
    pub original_ask_price: Decimal,
    pub commission: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl NewPriceRecord {
    pub fn from_computed(symbol: impl Into<String>, price: &ComputedPrice) -> Self {
        Self {
            symbol: symbol.into(),
            bid_price: price.bid_price,
            ask_price: price.ask_price,
            mid_price: price.mid_price,
            original_bid_price: price.original_bid_price,
            original_ask_price: price.original_ask_price,
            commission: price.commission,
            timestamp: price.timestamp,
        }
    }

    /// Check the record against the column constraints of the `prices` table.
    ///
    /// Run once by every store before a write.
    pub fn validate(&self) -> PriceResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(PriceError::InvalidQuote("symbol must not be empty".to_string()));
        }
        if self.symbol.len() > MAX_SYMBOL_LEN {
            return Err(PriceError::InvalidQuote(format!(
                "symbol {} exceeds {} characters",
                self.symbol, MAX_SYMBOL_LEN
            )));
        }

        let prices = [
            ("bid_price", self.bid_price),
            ("ask_price", self.ask_price),
            ("mid_price", self.mid_price),
            ("original_bid_price", self.original_bid_price),
            ("original_ask_price", self.original_ask_price),
        ];
        for (field, value) in prices {
            if value < Decimal::ZERO {
                return Err(PriceError::InvalidQuote(format!(
                    "{} must not be negative (got {})",
                    field, value
                )));
            }
        }

        if self.commission < Decimal::ZERO || self.commission > Decimal::ONE {
            return Err(PriceError::InvalidCommission(self.commission));
        }

        Ok(())
    }
}

/// Persisted price row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceRecord {
    pub id: i64,
    pub symbol: String,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub mid_price: Decimal,
    pub original_bid_price: Decimal,
    pub original_ask_price: Decimal,
    pub commission: Decimal,
    /// When the price was computed
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PriceRecord {
    /// Attach store-assigned fields to a validated record
    pub fn from_new(id: i64, record: NewPriceRecord, stored_at: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: record.symbol,
            bid_price: record.bid_price,
            ask_price: record.ask_price,
            mid_price: record.mid_price,
            original_bid_price: record.original_bid_price,
            original_ask_price: record.original_ask_price,
            commission: record.commission,
            timestamp: record.timestamp,
            created_at: stored_at,
            updated_at: stored_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_record() -> NewPriceRecord {
        NewPriceRecord {
            symbol: "BTCUSDT".to_string(),
            bid_price: Decimal::from_str("49950").unwrap(),
            ask_price: Decimal::from_str("50150.1").unwrap(),
            mid_price: Decimal::from_str("50050.05").unwrap(),
            original_bid_price: Decimal::from_str("50000").unwrap(),
            original_ask_price: Decimal::from_str("50100").unwrap(),
            commission: Decimal::from_str("0.001").unwrap(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_valid_record_passes() {
        assert!(sample_record().validate().is_ok());
    }

    #[test]
    fn test_zero_bid_is_allowed() {
        // commission = 1 drives the bid to exactly zero
        let mut record = sample_record();
        record.bid_price = Decimal::ZERO;
        record.commission = Decimal::ONE;
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_symbol() {
        let mut record = sample_record();
        record.symbol = "  ".to_string();
        assert!(matches!(record.validate(), Err(PriceError::InvalidQuote(_))));

        record.symbol = "BTCUSDTPERPETUALSWAPS".to_string();
        assert!(matches!(record.validate(), Err(PriceError::InvalidQuote(_))));

        record.symbol = "1000SATSUSDT".to_string();
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_price() {
        let mut record = sample_record();
        record.mid_price = Decimal::from_str("-1").unwrap();
        assert!(matches!(record.validate(), Err(PriceError::InvalidQuote(_))));
    }

    #[test]
    fn test_rejects_commission_out_of_range() {
        let mut record = sample_record();
        record.commission = Decimal::from_str("1.5").unwrap();
        assert!(matches!(
            record.validate(),
            Err(PriceError::InvalidCommission(_))
        ));
    }

    #[test]
    fn test_from_new_assigns_store_fields() {
        let new = sample_record();
        let stored_at = Utc::now();
        let record = PriceRecord::from_new(7, new.clone(), stored_at);
        assert_eq!(record.id, 7);
        assert_eq!(record.symbol, new.symbol);
        assert_eq!(record.timestamp, new.timestamp);
        assert_eq!(record.created_at, stored_at);
        assert_eq!(record.updated_at, stored_at);
    }
}
