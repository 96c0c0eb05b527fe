//! Commission pricing.

pub mod calculator;

pub use calculator::{PriceCalculator, SpreadMetrics, DEFAULT_COMMISSION};
