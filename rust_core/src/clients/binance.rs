//! Binance API Client
//!
//! Fetches best bid/ask quotes from the Binance public book ticker endpoint.
//! No API key required for public endpoints.
//!
//! Error classification:
//! - HTTP 429 / 418 (IP ban after repeated 429s) -> `RateLimited`
//! - HTTP 400 -> `InvalidSymbol`
//! - request deadline exceeded -> `Timeout`
//! - connect / DNS failure -> `Unreachable`
//! - any other non-2xx or undecodable body -> `UpstreamError`
//! - well-formed response with unusable prices -> `InvalidQuote`

use super::{MarketDataClient, ProviderStatus};
use crate::error::{PriceError, PriceResult};
use crate::models::{Quote, MAX_SYMBOL_LEN};
use crate::pricing::calculator::parse_price;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const BOOK_TICKER_PATH: &str = "/api/v3/ticker/bookTicker";
const PING_PATH: &str = "/api/v3/ping";

const MIN_SYMBOL_LEN: usize = 3;

/// Longest slice of an error body kept in error messages
const MAX_ERROR_BODY: usize = 200;

/// Connection settings for [`BinanceClient`]
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// Base URL without the `/api/v3` suffix
    pub base_url: String,
    /// Hard deadline for a single request
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            user_agent: "ticker-price-worker/1.0".to_string(),
        }
    }
}

/// Binance book ticker client implementing [`MarketDataClient`]
pub struct BinanceClient {
    client: Client,
    config: BinanceConfig,
    /// Status after the most recent fetch
    status: RwLock<ProviderStatus>,
}

impl BinanceClient {
    /// Create a new Binance client
    pub fn new(config: BinanceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            status: RwLock::new(ProviderStatus::Healthy),
        })
    }

    pub fn config(&self) -> &BinanceConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn set_status(&self, status: ProviderStatus) {
        *self.status.write() = status;
    }

    /// Record the provider status implied by a failed call
    fn record_failure(&self, err: &PriceError) {
        let status = match err {
            PriceError::RateLimited => ProviderStatus::RateLimited,
            PriceError::Timeout(_) | PriceError::Unreachable(_) => ProviderStatus::Unavailable,
            _ => ProviderStatus::Error,
        };
        self.set_status(status);
    }

    /// Map a reqwest failure onto the error taxonomy
    fn classify_transport(&self, err: reqwest::Error) -> PriceError {
        if err.is_timeout() {
            PriceError::Timeout(timeout_ms(self.config.timeout))
        } else if err.is_connect() {
            PriceError::Unreachable(err.to_string())
        } else {
            PriceError::UpstreamError(err.to_string())
        }
    }

    async fn fetch_quote_inner(&self, symbol: &str) -> PriceResult<Quote> {
        let url = self.url(BOOK_TICKER_PATH);
        debug!("Fetching {} book ticker from Binance", symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body, symbol));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let ticker: BookTicker = serde_json::from_str(&body).map_err(|e| {
            PriceError::UpstreamError(format!("malformed book ticker payload: {}", e))
        })?;

        validate_ticker(symbol, ticker)
    }
}

#[async_trait]
impl MarketDataClient for BinanceClient {
    fn provider_name(&self) -> &str {
        "Binance"
    }

    fn status(&self) -> ProviderStatus {
        *self.status.read()
    }

    async fn fetch_quote(&self, symbol: &str) -> PriceResult<Quote> {
        let symbol = symbol.trim().to_uppercase();
        validate_symbol(&symbol)?;

        match self.fetch_quote_inner(&symbol).await {
            Ok(quote) => {
                self.set_status(ProviderStatus::Healthy);
                debug!(
                    "Binance {} quote: bid {} / ask {}",
                    quote.symbol, quote.raw_bid, quote.raw_ask
                );
                Ok(quote)
            }
            Err(e) => {
                self.record_failure(&e);
                warn!("Binance {} fetch failed ({}): {}", symbol, e.kind(), e);
                Err(e)
            }
        }
    }

    async fn test_connectivity(&self) -> bool {
        match self.client.get(self.url(PING_PATH)).send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    "Binance connectivity check succeeded ({})",
                    self.config.base_url
                );
                true
            }
            Ok(response) => {
                warn!(
                    "Binance connectivity check failed: HTTP {}",
                    response.status()
                );
                false
            }
            Err(e) => {
                warn!("Binance connectivity check failed: {}", e);
                false
            }
        }
    }
}

/// Reject symbols Binance can never accept without spending a request
fn validate_symbol(symbol: &str) -> PriceResult<()> {
    if symbol.len() < MIN_SYMBOL_LEN || symbol.len() > MAX_SYMBOL_LEN {
        return Err(PriceError::InvalidSymbol(format!(
            "{:?} must be {}-{} characters",
            symbol, MIN_SYMBOL_LEN, MAX_SYMBOL_LEN
        )));
    }
    if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PriceError::InvalidSymbol(format!(
            "{:?} must be alphanumeric",
            symbol
        )));
    }
    Ok(())
}

/// Map a non-2xx HTTP status onto the error taxonomy
fn classify_status(status: u16, body: &str, symbol: &str) -> PriceError {
    let detail = match serde_json::from_str::<BinanceErrorBody>(body) {
        Ok(err) => format!("{} (code {})", err.msg, err.code),
        Err(_) => body.chars().take(MAX_ERROR_BODY).collect(),
    };

    match status {
        429 | 418 => PriceError::RateLimited,
        400 => PriceError::InvalidSymbol(format!("{}: {}", symbol, detail)),
        _ => PriceError::UpstreamError(format!("HTTP {}: {}", status, detail)),
    }
}

/// Re-validate a decoded ticker before handing it out as a [`Quote`]
fn validate_ticker(requested: &str, ticker: BookTicker) -> PriceResult<Quote> {
    let symbol = ticker
        .symbol
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PriceError::InvalidQuote("book ticker is missing symbol".to_string()))?;

    if !symbol.eq_ignore_ascii_case(requested) {
        return Err(PriceError::InvalidQuote(format!(
            "book ticker symbol {} does not match requested {}",
            symbol, requested
        )));
    }

    let raw_bid = ticker
        .bid_price
        .ok_or_else(|| PriceError::InvalidQuote("book ticker is missing bidPrice".to_string()))?;
    let raw_ask = ticker
        .ask_price
        .ok_or_else(|| PriceError::InvalidQuote("book ticker is missing askPrice".to_string()))?;

    let bid = parse_price("bid", &raw_bid)?;
    let ask = parse_price("ask", &raw_ask)?;
    if bid >= ask {
        return Err(PriceError::InvalidQuote(format!(
            "bid {} must be below ask {}",
            bid, ask
        )));
    }

    Ok(Quote {
        symbol,
        raw_bid,
        raw_ask,
        received_at: Utc::now(),
    })
}

/// Request deadline in whole milliseconds, saturating at `u64::MAX`
fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Binance `/api/v3/ticker/bookTicker` response.
///
/// Fields are optional so a missing price is reported as an invalid quote
/// rather than a decode failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    symbol: Option<String>,
    bid_price: Option<String>,
    ask_price: Option<String>,
}

/// Binance error payload, e.g. `{"code":-1121,"msg":"Invalid symbol."}`
#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TICKER_OK: &str = r#"{"symbol":"BTCUSDT","bidPrice":"50000.00","bidQty":"1.5","askPrice":"50100.00","askQty":"2.0"}"#;

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    /// Serve a single canned HTTP response on a local port
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    /// Accept a connection and never answer
    async fn serve_silent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(socket);
            }
        });
        format!("http://{}", addr)
    }

    /// Address with nothing listening on it
    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn client_for(base_url: String) -> BinanceClient {
        BinanceClient::new(BinanceConfig {
            base_url,
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_quote_success() {
        let client = client_for(serve_once(http_response("200 OK", TICKER_OK)).await);

        let quote = client.fetch_quote("btcusdt").await.unwrap();
        assert_eq!(quote.symbol, "BTCUSDT");
        assert_eq!(quote.raw_bid, "50000.00");
        assert_eq!(quote.raw_ask, "50100.00");
        assert_eq!(client.status(), ProviderStatus::Healthy);
    }

    #[tokio::test]
    async fn test_rate_limit_429() {
        let body = r#"{"code":-1003,"msg":"Too many requests."}"#;
        let client = client_for(serve_once(http_response("429 Too Many Requests", body)).await);

        let err = client.fetch_quote("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, PriceError::RateLimited));
        assert_eq!(client.status(), ProviderStatus::RateLimited);
    }

    #[tokio::test]
    async fn test_ip_ban_418_is_rate_limited() {
        let client = client_for(serve_once(http_response("418 I'm a teapot", "{}")).await);

        let err = client.fetch_quote("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, PriceError::RateLimited));
    }

    #[tokio::test]
    async fn test_invalid_symbol_400() {
        let body = r#"{"code":-1121,"msg":"Invalid symbol."}"#;
        let client = client_for(serve_once(http_response("400 Bad Request", body)).await);

        let err = client.fetch_quote("FOOBAR").await.unwrap_err();
        match err {
            PriceError::InvalidSymbol(msg) => assert!(msg.contains("Invalid symbol.")),
            other => panic!("expected InvalidSymbol, got {:?}", other),
        }
        assert_eq!(client.status(), ProviderStatus::Error);
    }

    #[tokio::test]
    async fn test_server_error_is_upstream_error() {
        let client =
            client_for(serve_once(http_response("503 Service Unavailable", "maintenance")).await);

        let err = client.fetch_quote("BTCUSDT").await.unwrap_err();
        match err {
            PriceError::UpstreamError(msg) => assert!(msg.contains("503")),
            other => panic!("expected UpstreamError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_is_upstream_error() {
        let client = client_for(serve_once(http_response("200 OK", "<html>oops</html>")).await);

        let err = client.fetch_quote("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, PriceError::UpstreamError(_)));
    }

    #[tokio::test]
    async fn test_inverted_payload_is_invalid_quote() {
        let body = r#"{"symbol":"BTCUSDT","bidPrice":"50100.00","bidQty":"1","askPrice":"50000.00","askQty":"1"}"#;
        let client = client_for(serve_once(http_response("200 OK", body)).await);

        let err = client.fetch_quote("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, PriceError::InvalidQuote(_)));
        assert_eq!(client.status(), ProviderStatus::Error);
    }

    #[tokio::test]
    async fn test_missing_price_is_invalid_quote() {
        let body = r#"{"symbol":"BTCUSDT","bidPrice":"50000.00","bidQty":"1"}"#;
        let client = client_for(serve_once(http_response("200 OK", body)).await);

        let err = client.fetch_quote("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, PriceError::InvalidQuote(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let client = client_for(serve_silent().await);

        let err = client.fetch_quote("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, PriceError::Timeout(200)));
        assert_eq!(client.status(), ProviderStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let client = client_for(closed_port().await);

        let err = client.fetch_quote("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, PriceError::Unreachable(_)));
        assert_eq!(client.status(), ProviderStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_bad_symbol_rejected_before_request() {
        // Nothing listens here; a request would come back Unreachable
        let client = client_for(closed_port().await);

        for symbol in ["", "BT", "BTC/USDT", "AVERYLONGSYMBOLNAMEXX"] {
            let err = client.fetch_quote(symbol).await.unwrap_err();
            assert!(
                matches!(err, PriceError::InvalidSymbol(_)),
                "{:?} should be rejected locally",
                symbol
            );
        }
    }

    #[tokio::test]
    async fn test_connectivity_success() {
        let client = client_for(serve_once(http_response("200 OK", "{}")).await);
        assert!(client.test_connectivity().await);
    }

    #[tokio::test]
    async fn test_connectivity_failure_reports_false() {
        let client = client_for(closed_port().await);
        assert!(!client.test_connectivity().await);

        let client = client_for(serve_once(http_response("500 Internal Server Error", "")).await);
        assert!(!client.test_connectivity().await);
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(429, "", "BTCUSDT"), PriceError::RateLimited));
        assert!(matches!(
            classify_status(400, "", "BTCUSDT"),
            PriceError::InvalidSymbol(_)
        ));
        assert!(matches!(
            classify_status(404, "", "BTCUSDT"),
            PriceError::UpstreamError(_)
        ));

        match classify_status(500, r#"{"code":-1000,"msg":"Unknown error."}"#, "BTCUSDT") {
            PriceError::UpstreamError(msg) => {
                assert_eq!(msg, "HTTP 500: Unknown error. (code -1000)")
            }
            other => panic!("expected UpstreamError, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_ms_saturates() {
        assert_eq!(timeout_ms(Duration::from_millis(2500)), 2500);
        assert_eq!(timeout_ms(Duration::from_secs(u64::MAX)), u64::MAX);
    }

    #[test]
    fn test_validate_ticker_rejects_wrong_symbol() {
        let ticker = BookTicker {
            symbol: Some("ETHUSDT".to_string()),
            bid_price: Some("1".to_string()),
            ask_price: Some("2".to_string()),
        };
        assert!(matches!(
            validate_ticker("BTCUSDT", ticker),
            Err(PriceError::InvalidQuote(_))
        ));
    }

    #[test]
    fn test_validate_ticker_keeps_raw_strings() {
        let ticker = BookTicker {
            symbol: Some("BTCUSDT".to_string()),
            bid_price: Some("50000.12000000".to_string()),
            ask_price: Some("50000.13000000".to_string()),
        };
        let quote = validate_ticker("BTCUSDT", ticker).unwrap();
        assert_eq!(quote.raw_bid, "50000.12000000");
        assert_eq!(
            Decimal::from_str(&quote.raw_ask).unwrap(),
            Decimal::from_str("50000.13").unwrap()
        );
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_live_book_ticker() {
        let client = BinanceClient::new(BinanceConfig::default()).unwrap();
        let quote = client.fetch_quote("BTCUSDT").await.unwrap();
        assert_eq!(quote.symbol, "BTCUSDT");
        assert!(client.test_connectivity().await);
    }
}
