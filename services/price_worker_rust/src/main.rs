use anyhow::Result;
use dotenv::dotenv;
use price_worker_rust::{PriceWorkerConfig, PriceWorkerService};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("price_worker_rust=info".parse()?)
        .add_directive("ticker_rust_core=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting price_worker_rust...");

    let config = PriceWorkerConfig::from_env()?;
    info!(
        "Polling {} every {}ms (commission {})",
        config.symbol, config.update_interval_ms, config.commission
    );

    let service = PriceWorkerService::connect(config).await?;
    service.run().await
}
