//! Service wiring and background tasks

use crate::config::PriceWorkerConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use ticker_rust_core::clients::{BinanceClient, MarketDataClient};
use ticker_rust_core::db::health::get_pool_stats;
use ticker_rust_core::db::schema::ensure_schema;
use ticker_rust_core::db::{create_pool, PgPriceStore, PriceStore};
use ticker_rust_core::worker::{PollingWorker, WorkerState, WorkerStatus};
use ticker_rust_core::{PriceCalculator, PriceOrchestrator};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub struct PriceWorkerService {
    config: PriceWorkerConfig,
    orchestrator: Arc<PriceOrchestrator>,
    worker: Arc<PollingWorker>,
}

impl PriceWorkerService {
    /// Connect to PostgreSQL and Binance and assemble the pipeline
    pub async fn connect(config: PriceWorkerConfig) -> Result<Self> {
        let pool = create_pool(&config.database_url, &config.db_pool).await?;
        ensure_schema(&pool)
            .await
            .context("Failed to prepare prices table")?;

        let stats = get_pool_stats(&pool);
        info!("Database ready ({} connections, {} idle)", stats.size, stats.idle);

        let client = BinanceClient::new(config.binance_config())?;
        let store = PgPriceStore::new(pool);

        Self::from_parts(config, Arc::new(client), Arc::new(store))
    }

    /// Assemble the pipeline over an existing client and store
    pub fn from_parts(
        config: PriceWorkerConfig,
        client: Arc<dyn MarketDataClient>,
        store: Arc<dyn PriceStore>,
    ) -> Result<Self> {
        let calculator = Arc::new(PriceCalculator::new(config.commission)?);
        let orchestrator = Arc::new(PriceOrchestrator::new(
            config.symbol.as_str(),
            client,
            calculator,
            store,
        ));
        let worker = Arc::new(PollingWorker::new(
            orchestrator.clone(),
            config.worker_config(),
        )?);

        Ok(Self {
            config,
            orchestrator,
            worker,
        })
    }

    pub fn orchestrator(&self) -> &Arc<PriceOrchestrator> {
        &self.orchestrator
    }

    pub fn worker(&self) -> &Arc<PollingWorker> {
        &self.worker
    }

    /// Probe the feed, start the worker and the background tasks
    pub async fn start(&self) -> Vec<JoinHandle<()>> {
        if self.orchestrator.test_connectivity().await {
            info!("Market data feed reachable");
        } else {
            warn!("Market data feed unreachable at startup; worker backoff will handle it");
        }

        self.worker.start();

        let mut tasks = Vec::new();

        // 1. Retention
        let orchestrator = self.orchestrator.clone();
        let retention_days = self.config.retention_days;
        let retention_interval = Duration::from_secs(self.config.retention_interval_secs);
        tasks.push(tokio::spawn(async move {
            info!(
                "Retention loop started (keep {} days, every {}s)",
                retention_days,
                retention_interval.as_secs()
            );
            let mut ticker = tokio::time::interval(retention_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                run_retention_cycle(&orchestrator, retention_days).await;
            }
        }));

        // 2. Status heartbeat
        let worker = self.worker.clone();
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval_secs);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                log_status(&worker.status());
            }
        }));

        tasks
    }

    /// Run until ctrl-c, then shut the worker down
    pub async fn run(self) -> Result<()> {
        let tasks = self.start().await;

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        for task in &tasks {
            task.abort();
        }
        self.worker.shutdown().await;
        Ok(())
    }
}

/// One retention pass; failures are logged and retried next interval
pub async fn run_retention_cycle(orchestrator: &PriceOrchestrator, retention_days: u32) -> u64 {
    match orchestrator.cleanup(retention_days).await {
        Ok(removed) => removed,
        Err(e) => {
            error!("Price retention cleanup failed: {}", e);
            0
        }
    }
}

pub fn log_status(status: &WorkerStatus) {
    let summary = serde_json::to_string(status).unwrap_or_default();
    if status.state == WorkerState::Halted {
        warn!("Price worker halted; manual restart required: {}", summary);
    } else {
        info!("Price worker status: {}", summary);
    }
}
