//! Commission price calculator.
//!
//! Turns a raw [`Quote`] into a [`ComputedPrice`]:
//! - bid = raw_bid * (1 - commission)
//! - ask = raw_ask * (1 + commission)
//! - mid = (bid + ask) / 2
//!
//! All arithmetic is exact decimal; results are rounded half-up to
//! [`PRICE_DECIMALS`] places. Spread percentages are rounded to
//! [`PERCENTAGE_DECIMALS`] places.

use crate::error::{PriceError, PriceResult};
use crate::models::{ComputedPrice, Quote};
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info};

/// Decimal places kept for persisted and displayed prices
pub const PRICE_DECIMALS: u32 = 8;
/// Decimal places kept for spread percentages
pub const PERCENTAGE_DECIMALS: u32 = 4;
/// 0.0001 (1 basis point)
pub const DEFAULT_COMMISSION: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

/// Derived spread figures for a bid/ask pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadMetrics {
    pub spread: Decimal,
    /// Spread relative to mid, in percent, rounded to 4 places
    pub spread_percentage: Decimal,
}

/// Applies the configured commission to raw quotes.
///
/// The commission is the only mutable state. Each computation reads it once,
/// so an update lands on the next computation and never on one in progress.
pub struct PriceCalculator {
    commission: RwLock<Decimal>,
}

impl PriceCalculator {
    /// Create a calculator, rejecting commissions outside [0, 1]
    pub fn new(commission: Decimal) -> PriceResult<Self> {
        validate_commission(commission)?;
        Ok(Self {
            commission: RwLock::new(commission),
        })
    }

    /// Current commission ratio
    pub fn commission(&self) -> Decimal {
        *self.commission.read()
    }

    /// Replace the commission for subsequent computations
    pub fn set_commission(&self, commission: Decimal) -> PriceResult<()> {
        validate_commission(commission)?;

        let previous = {
            let mut current = self.commission.write();
            std::mem::replace(&mut *current, commission)
        };
        info!("Commission updated from {} to {}", previous, commission);
        Ok(())
    }

    /// Validate a quote and apply the commission to it
    pub fn compute(&self, quote: &Quote) -> PriceResult<ComputedPrice> {
        let original_bid = parse_price("bid", &quote.raw_bid)?;
        let original_ask = parse_price("ask", &quote.raw_ask)?;

        if original_bid >= original_ask {
            return Err(PriceError::InvertedSpread {
                bid: original_bid,
                ask: original_ask,
            });
        }

        let commission = self.commission();

        let bid = original_bid
            .checked_mul(Decimal::ONE - commission)
            .ok_or_else(|| overflow("bid", original_bid))?;
        let ask = original_ask
            .checked_mul(Decimal::ONE + commission)
            .ok_or_else(|| overflow("ask", original_ask))?;
        let mid = bid
            .checked_add(ask)
            .map(|sum| sum / Decimal::TWO)
            .ok_or_else(|| overflow("mid", ask))?;

        let price = ComputedPrice {
            bid_price: round_price(bid),
            ask_price: round_price(ask),
            mid_price: round_price(mid),
            original_bid_price: original_bid,
            original_ask_price: original_ask,
            commission,
            timestamp: Utc::now(),
        };

        debug!(
            "Computed {} price: bid {} -> {}, ask {} -> {}, mid {} (commission {})",
            quote.symbol,
            original_bid,
            price.bid_price,
            original_ask,
            price.ask_price,
            price.mid_price,
            commission
        );

        Ok(price)
    }

    /// Ask minus bid
    pub fn spread(bid: Decimal, ask: Decimal) -> Decimal {
        ask - bid
    }

    /// Spread relative to the mid price, in percent (unrounded).
    ///
    /// Zero when the mid price is zero or the figures overflow.
    pub fn spread_percentage(bid: Decimal, ask: Decimal) -> Decimal {
        bid.checked_add(ask)
            .map(|sum| sum / Decimal::TWO)
            .and_then(|mid| Self::spread(bid, ask).checked_div(mid))
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO)
    }

    /// Spread and display-rounded spread percentage of a computed price
    pub fn spread_metrics(price: &ComputedPrice) -> SpreadMetrics {
        SpreadMetrics {
            spread: Self::spread(price.bid_price, price.ask_price),
            spread_percentage: round_percentage(Self::spread_percentage(
                price.bid_price,
                price.ask_price,
            )),
        }
    }
}

impl Default for PriceCalculator {
    fn default() -> Self {
        Self {
            commission: RwLock::new(DEFAULT_COMMISSION),
        }
    }
}

/// Round half-up to 8 decimal places
pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// Round half-up to 4 decimal places
pub fn round_percentage(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PERCENTAGE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

fn validate_commission(commission: Decimal) -> PriceResult<()> {
    if commission < Decimal::ZERO || commission > Decimal::ONE {
        return Err(PriceError::InvalidCommission(commission));
    }
    Ok(())
}

fn overflow(side: &str, value: Decimal) -> PriceError {
    PriceError::InvalidQuote(format!(
        "{} price {} is out of range after commission",
        side, value
    ))
}

/// Parse a raw price string into a strictly positive decimal
pub(crate) fn parse_price(side: &str, raw: &str) -> PriceResult<Decimal> {
    let value = Decimal::from_str(raw.trim()).map_err(|_| {
        PriceError::InvalidQuote(format!("{} price {:?} is not a decimal number", side, raw))
    })?;

    if value <= Decimal::ZERO {
        return Err(PriceError::InvalidQuote(format!(
            "{} price must be positive (got {})",
            side, value
        )));
    }

    Ok(value)
}
