//! In-process price store.
//!
//! Same ordering and id semantics as the PostgreSQL store, without a
//! database. Used by tests and for dry runs of the worker.

use super::prices::PriceStore;
use crate::error::PriceResult;
use crate::models::{NewPriceRecord, PriceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Reverse;

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: Vec<PriceRecord>,
}

/// [`PriceStore`] holding records in memory
#[derive(Default)]
pub struct InMemoryPriceStore {
    table: RwLock<Table>,
}

impl InMemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all symbols
    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn newest_first(&self, symbol: &str) -> Vec<PriceRecord> {
        let table = self.table.read();
        let mut rows: Vec<PriceRecord> = table
            .rows
            .iter()
            .filter(|r| r.symbol == symbol)
            .cloned()
            .collect();
        rows.sort_by_key(|r| Reverse((r.timestamp, r.id)));
        rows
    }
}

#[async_trait]
impl PriceStore for InMemoryPriceStore {
    async fn insert(&self, record: NewPriceRecord) -> PriceResult<PriceRecord> {
        record.validate()?;

        // id assignment and push happen under one write lock
        let mut table = self.table.write();
        table.next_id += 1;
        let stored = PriceRecord::from_new(table.next_id, record, Utc::now());
        table.rows.push(stored.clone());
        Ok(stored)
    }

    async fn latest(&self, symbol: &str) -> PriceResult<Option<PriceRecord>> {
        Ok(self.newest_first(symbol).into_iter().next())
    }

    async fn history(&self, symbol: &str, limit: u32) -> PriceResult<Vec<PriceRecord>> {
        let mut rows = self.newest_first(symbol);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn delete_older_than(&self, symbol: &str, cutoff: DateTime<Utc>) -> PriceResult<u64> {
        let mut table = self.table.write();
        let before = table.rows.len();
        table
            .rows
            .retain(|r| !(r.symbol == symbol && r.timestamp < cutoff));
        Ok((before - table.rows.len()) as u64)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
