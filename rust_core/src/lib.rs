//! Ticker Core - price polling, commission pricing and persistence.
//!
//! This crate provides:
//! - Market data clients (Binance best bid/ask)
//! - Commission-adjusted price calculation with fixed-point decimals
//! - Append-only price storage (PostgreSQL, in-memory)
//! - Fetch/compute/store orchestration for one configured symbol
//! - A polling worker with exponential backoff and a consecutive-error breaker

pub mod clients;
pub mod db;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pricing;
pub mod worker;

pub use error::{ErrorKind, PriceError, PriceResult};
pub use models::{ComputedPrice, NewPriceRecord, PriceRecord, Quote};
pub use orchestrator::PriceOrchestrator;
pub use pricing::PriceCalculator;
pub use worker::{PollingWorker, WorkerConfig, WorkerState, WorkerStatus};
