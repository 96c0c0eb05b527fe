//! Fetch → compute → persist composition for the configured symbol.
//!
//! The orchestrator never retries and never swallows errors: whatever the
//! client, calculator or store returns is propagated unchanged to the
//! caller. Retry policy lives in the worker alone.

use crate::clients::MarketDataClient;
use crate::db::PriceStore;
use crate::error::PriceResult;
use crate::models::{NewPriceRecord, PriceRecord};
use crate::pricing::PriceCalculator;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Smallest history page a caller may ask for
pub const MIN_HISTORY_LIMIT: u32 = 1;
/// Largest history page a caller may ask for
pub const MAX_HISTORY_LIMIT: u32 = 1000;
/// History page size when the caller has no preference
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;
/// Retention window used when none is configured
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

pub struct PriceOrchestrator {
    symbol: String,
    client: Arc<dyn MarketDataClient>,
    calculator: Arc<PriceCalculator>,
    store: Arc<dyn PriceStore>,
}

impl PriceOrchestrator {
    pub fn new(
        symbol: impl Into<String>,
        client: Arc<dyn MarketDataClient>,
        calculator: Arc<PriceCalculator>,
        store: Arc<dyn PriceStore>,
    ) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            client,
            calculator,
            store,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn calculator(&self) -> &Arc<PriceCalculator> {
        &self.calculator
    }

    /// Run one cycle: fetch a quote, apply commission, store the record.
    ///
    /// The returned record is a snapshot of what was persisted.
    pub async fn fetch_and_store(&self) -> PriceResult<PriceRecord> {
        let started = Instant::now();
        debug!("Fetching {} from {}", self.symbol, self.client.provider_name());

        let quote = self.client.fetch_quote(&self.symbol).await?;
        let price = self.calculator.compute(&quote)?;
        let record = NewPriceRecord::from_computed(self.symbol.as_str(), &price);
        let stored = self.store.insert(record).await?;

        debug!(
            "Stored {} price #{} (mid {}) in {}ms",
            stored.symbol,
            stored.id,
            stored.mid_price,
            started.elapsed().as_millis()
        );

        Ok(stored)
    }

    /// Most recent record, or `None` before the first successful cycle
    pub async fn latest(&self) -> PriceResult<Option<PriceRecord>> {
        let latest = self.store.latest(&self.symbol).await?;
        if latest.is_none() {
            debug!("No price data stored yet for {}", self.symbol);
        }
        Ok(latest)
    }

    /// Newest-first history. `limit` is clamped to
    /// [`MIN_HISTORY_LIMIT`]..=[`MAX_HISTORY_LIMIT`].
    pub async fn history(&self, limit: u32) -> PriceResult<Vec<PriceRecord>> {
        let limit = limit.clamp(MIN_HISTORY_LIMIT, MAX_HISTORY_LIMIT);
        self.store.history(&self.symbol, limit).await
    }

    /// Delete records computed more than `older_than_days` days ago.
    /// Any `u32` is accepted; oversized windows delete nothing.
    pub async fn cleanup(&self, older_than_days: u32) -> PriceResult<u64> {
        // Windows reaching past the earliest representable instant keep everything
        let cutoff = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(older_than_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.store.delete_older_than(&self.symbol, cutoff).await?;

        info!(
            "Cleaned up {} {} price records older than {} days",
            removed, self.symbol, older_than_days
        );
        Ok(removed)
    }

    /// Liveness of the market data feed
    pub async fn test_connectivity(&self) -> bool {
        self.client.test_connectivity().await
    }

    /// Liveness of the price store
    pub async fn store_healthy(&self) -> bool {
        self.store.is_healthy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockMarketDataClient;
    use crate::db::prices::MockPriceStore;
    use crate::db::InMemoryPriceStore;
    use crate::error::PriceError;
    use crate::models::Quote;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn client_returning(bid: &'static str, ask: &'static str) -> MockMarketDataClient {
        let mut client = MockMarketDataClient::new();
        client.expect_provider_name().return_const("Mock".to_string());
        client
            .expect_fetch_quote()
            .with(eq("BTCUSDT"))
            .returning(move |symbol| Ok(Quote::new(symbol, bid, ask)));
        client
    }

    fn orchestrator(
        client: MockMarketDataClient,
        store: Arc<dyn PriceStore>,
        commission: &str,
    ) -> PriceOrchestrator {
        PriceOrchestrator::new(
            "btcusdt",
            Arc::new(client),
            Arc::new(PriceCalculator::new(dec(commission)).unwrap()),
            store,
        )
    }

    #[tokio::test]
    async fn test_fetch_and_store_end_to_end() {
        let store = Arc::new(InMemoryPriceStore::new());
        let orch = orchestrator(client_returning("50000.00", "50100.00"), store.clone(), "0.001");

        let record = orch.fetch_and_store().await.unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(record.symbol, "BTCUSDT");
        assert_eq!(record.bid_price, dec("49950"));
        assert_eq!(record.ask_price, dec("50150.1"));
        assert_eq!(record.mid_price, dec("50050.05"));
        assert_eq!(record.original_bid_price, dec("50000"));
        assert_eq!(record.original_ask_price, dec("50100"));
        assert_eq!(record.commission, dec("0.001"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_record_carries_commission_at_fetch_time() {
        let store = Arc::new(InMemoryPriceStore::new());
        let orch = orchestrator(client_returning("50000", "50100"), store, "0.001");

        let first = orch.fetch_and_store().await.unwrap();
        orch.calculator().set_commission(dec("0.002")).unwrap();
        let second = orch.fetch_and_store().await.unwrap();

        assert_eq!(first.commission, dec("0.001"));
        assert_eq!(second.commission, dec("0.002"));
        assert_eq!(second.bid_price, dec("49900"));

        // earlier snapshot is unaffected
        let history = orch.history(10).await.unwrap();
        assert_eq!(history[1].commission, dec("0.001"));
    }

    #[tokio::test]
    async fn test_transport_error_propagates_unchanged() {
        let mut client = MockMarketDataClient::new();
        client.expect_provider_name().return_const("Mock".to_string());
        client
            .expect_fetch_quote()
            .times(1)
            .returning(|_| Err(PriceError::RateLimited));

        let mut store = MockPriceStore::new();
        store.expect_insert().never();

        let orch = orchestrator(client, Arc::new(store), "0.001");
        assert!(matches!(
            orch.fetch_and_store().await,
            Err(PriceError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_calculation_error_propagates_unchanged() {
        let mut store = MockPriceStore::new();
        store.expect_insert().never();

        let orch = orchestrator(client_returning("50100", "50000"), Arc::new(store), "0.001");
        assert!(matches!(
            orch.fetch_and_store().await,
            Err(PriceError::InvertedSpread { .. })
        ));
    }

    #[tokio::test]
    async fn test_storage_error_propagates_unchanged() {
        let mut store = MockPriceStore::new();
        store
            .expect_insert()
            .times(1)
            .returning(|_| Err(PriceError::Storage("connection reset".to_string())));

        let orch = orchestrator(client_returning("50000", "50100"), Arc::new(store), "0.001");
        let err = orch.fetch_and_store().await.unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_latest_is_none_before_first_cycle() {
        let orch = orchestrator(
            client_returning("50000", "50100"),
            Arc::new(InMemoryPriceStore::new()),
            "0.001",
        );
        assert!(orch.latest().await.unwrap().is_none());

        let stored = orch.fetch_and_store().await.unwrap();
        assert_eq!(orch.latest().await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_history_limit_is_clamped() {
        let mut store = MockPriceStore::new();
        store
            .expect_history()
            .with(eq("BTCUSDT"), eq(MAX_HISTORY_LIMIT))
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        store
            .expect_history()
            .with(eq("BTCUSDT"), eq(MIN_HISTORY_LIMIT))
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let orch = orchestrator(client_returning("50000", "50100"), Arc::new(store), "0.001");
        orch.history(5000).await.unwrap();
        orch.history(0).await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_uses_day_cutoff() {
        let mut store = MockPriceStore::new();
        store
            .expect_delete_older_than()
            .withf(|symbol, cutoff| {
                let expected = Utc::now() - Duration::days(30);
                symbol == "BTCUSDT" && (expected - *cutoff).num_seconds().abs() < 5
            })
            .times(1)
            .returning(|_, _| Ok(42));

        let orch = orchestrator(client_returning("50000", "50100"), Arc::new(store), "0.001");
        assert_eq!(orch.cleanup(30).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_cleanup_with_oversized_window_keeps_everything() {
        let store = Arc::new(InMemoryPriceStore::new());
        let orch = orchestrator(client_returning("50000", "50100"), store.clone(), "0.001");
        orch.fetch_and_store().await.unwrap();

        let removed = tokio::spawn(async move { orch.cleanup(u32::MAX).await })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(removed, 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_clamps_cutoff_to_earliest_instant() {
        let mut store = MockPriceStore::new();
        store
            .expect_delete_older_than()
            .withf(|_, cutoff| *cutoff == DateTime::<Utc>::MIN_UTC)
            .times(1)
            .returning(|_, _| Ok(0));

        let orch = orchestrator(client_returning("50000", "50100"), Arc::new(store), "0.001");
        assert_eq!(orch.cleanup(u32::MAX).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connectivity_proxies_to_client() {
        let mut client = MockMarketDataClient::new();
        client.expect_test_connectivity().times(1).returning(|| false);

        let orch = orchestrator(client, Arc::new(InMemoryPriceStore::new()), "0.001");
        assert!(!orch.test_connectivity().await);
        assert!(orch.store_healthy().await);
    }
}
