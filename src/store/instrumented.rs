//! Instrumented store wrapper that counts calls on any store implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{Connection, Table, TransactionalStore};
use crate::error::StoreError;

/// Read and write counts for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub reads: u64,
    pub writes: u64,
    pub failed: u64,
}

/// Snapshot of everything an [`InstrumentedStore`] has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub tables: BTreeMap<Table, TableStats>,
    pub connects: u64,
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

impl StoreStats {
    pub fn table(&self, table: Table) -> TableStats {
        self.tables.get(&table).copied().unwrap_or_default()
    }

    pub fn total_reads(&self) -> u64 {
        self.tables.values().map(|t| t.reads).sum()
    }

    pub fn total_writes(&self) -> u64 {
        self.tables.values().map(|t| t.writes).sum()
    }
}

/// Decorator recording per-table get/put counts and transaction calls.
///
/// ```rust,ignore
/// let store = Arc::new(InstrumentedStore::new(Arc::new(InMemoryStore::with_tables(100))));
/// // ... run workflows against `store` ...
/// assert_eq!(store.stats().commits, 1);
/// ```
pub struct InstrumentedStore {
    inner: Arc<dyn TransactionalStore>,
    stats: Mutex<StoreStats>,
}

impl InstrumentedStore {
    pub fn new(inner: Arc<dyn TransactionalStore>) -> Self {
        Self {
            inner,
            stats: Mutex::new(StoreStats::default()),
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn reset(&self) {
        *self.stats.lock().unwrap_or_else(|p| p.into_inner()) = StoreStats::default();
    }

    #[inline]
    fn record(&self, f: impl FnOnce(&mut StoreStats)) {
        f(&mut self.stats.lock().unwrap_or_else(|p| p.into_inner()));
    }

    #[inline]
    fn record_table<T>(&self, table: Table, result: &Result<T, StoreError>, write: bool) {
        self.record(|s| {
            let entry = s.tables.entry(table).or_default();
            if write {
                entry.writes += 1;
            } else {
                entry.reads += 1;
            }
            if result.is_err() {
                entry.failed += 1;
            }
        });
    }
}

#[async_trait::async_trait]
impl TransactionalStore for InstrumentedStore {
    async fn connect(&self) -> Result<Arc<Connection>, StoreError> {
        self.record(|s| s.connects += 1);
        self.inner.connect().await
    }

    async fn disconnect(&self, conn: &Connection) -> Result<(), StoreError> {
        self.inner.disconnect(conn).await
    }

    async fn begin(&self, conn: &Connection) -> Result<(), StoreError> {
        self.record(|s| s.begins += 1);
        self.inner.begin(conn).await
    }

    async fn commit(&self, conn: &Connection) -> Result<(), StoreError> {
        self.record(|s| s.commits += 1);
        self.inner.commit(conn).await
    }

    async fn rollback(&self, conn: &Connection) -> Result<(), StoreError> {
        self.record(|s| s.rollbacks += 1);
        self.inner.rollback(conn).await
    }

    async fn get(&self, conn: &Connection, table: Table, key: u64) -> Result<Option<String>, StoreError> {
        let result = self.inner.get(conn, table, key).await;
        self.record_table(table, &result, false);
        result
    }

    async fn put(&self, conn: &Connection, table: Table, key: u64, value: String) -> Result<(), StoreError> {
        let result = self.inner.put(conn, table, key, value).await;
        self.record_table(table, &result, true);
        result
    }
}
