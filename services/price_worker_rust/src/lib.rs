//! price_worker_rust - Polls a quote feed, applies commission, stores prices

pub mod config;
pub mod service;

pub use config::PriceWorkerConfig;
pub use service::PriceWorkerService;
