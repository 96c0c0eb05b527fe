//! `prices` table bootstrap.
//!
//! Creates the table and its two read indexes if they are missing. This is
//! a startup convenience, not a migration system.

use crate::error::PriceResult;
use sqlx::PgPool;
use tracing::info;

pub const CREATE_PRICES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS prices (
    id                   BIGSERIAL PRIMARY KEY,
    symbol               VARCHAR(20)    NOT NULL CHECK (symbol <> ''),
    bid_price            NUMERIC(20, 8) NOT NULL CHECK (bid_price >= 0),
    ask_price            NUMERIC(20, 8) NOT NULL CHECK (ask_price >= 0),
    mid_price            NUMERIC(20, 8) NOT NULL CHECK (mid_price >= 0),
    original_bid_price   NUMERIC(20, 8) NOT NULL CHECK (original_bid_price >= 0),
    original_ask_price   NUMERIC(20, 8) NOT NULL CHECK (original_ask_price >= 0),
    commission           NUMERIC(5, 4)  NOT NULL CHECK (commission >= 0 AND commission <= 1),
    timestamp            TIMESTAMPTZ    NOT NULL,
    created_at           TIMESTAMPTZ    NOT NULL DEFAULT NOW(),
    updated_at           TIMESTAMPTZ    NOT NULL DEFAULT NOW()
)
"#;

/// Latest/history lookups filter by symbol and sort by time
pub const CREATE_SYMBOL_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_prices_symbol_timestamp ON prices (symbol, timestamp DESC)";

/// Retention cleanup scans by time alone
pub const CREATE_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_prices_timestamp ON prices (timestamp)";

/// Create the `prices` table and indexes if they do not exist
pub async fn ensure_schema(pool: &PgPool) -> PriceResult<()> {
    for statement in [
        CREATE_PRICES_TABLE,
        CREATE_SYMBOL_TIMESTAMP_INDEX,
        CREATE_TIMESTAMP_INDEX,
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("prices schema ready");
    Ok(())
}
