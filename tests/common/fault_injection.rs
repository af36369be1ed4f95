//! Fault-injecting store for exercising the retry controller.
//!
//! Wraps an [`InMemoryStore`] and fails chosen calls on demand. Every call is
//! also recorded together with the connection and the logical timestamp it
//! carried, so tests can check what a replay looked like from the store's
//! side.

use async_trait::async_trait;
use checkout_sim::store::{Connection, InMemoryStore, Table, TransactionalStore};
use checkout_sim::StoreError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Connect,
    Disconnect,
    Begin,
    Commit,
    Rollback,
    Get(Table),
    Put(Table),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCall {
    pub kind: CallKind,
    pub conn: u64,
    /// Timestamp of the connection when the call was made (after the call for `Begin`)
    pub ts: u64,
    pub failed: bool,
}

pub struct FaultInjectingStore {
    inner: Arc<InMemoryStore>,
    read_faults: Mutex<BTreeMap<Table, u32>>,
    write_faults: Mutex<BTreeMap<Table, u32>>,
    commit_faults: AtomicU32,
    commit_aborts: AtomicU32,
    rollback_faults: AtomicU32,
    begin_faults: AtomicU32,
    calls: Mutex<Vec<StoreCall>>,
}

impl FaultInjectingStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            read_faults: Mutex::new(BTreeMap::new()),
            write_faults: Mutex::new(BTreeMap::new()),
            commit_faults: AtomicU32::new(0),
            commit_aborts: AtomicU32::new(0),
            rollback_faults: AtomicU32::new(0),
            begin_faults: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tables(key_space: u64) -> Self {
        Self::new(Arc::new(InMemoryStore::with_tables(key_space)))
    }

    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }

    /// The next `times` reads of `table` fail with a retryable error.
    pub fn fail_reads(&self, table: Table, times: u32) {
        self.read_faults.lock().unwrap().insert(table, times);
    }

    /// The next `times` writes to `table` fail with a retryable error.
    pub fn fail_writes(&self, table: Table, times: u32) {
        self.write_faults.lock().unwrap().insert(table, times);
    }

    /// The next `times` commits fail with a permanent error.
    pub fn fail_commits(&self, times: u32) {
        self.commit_faults.store(times, Ordering::SeqCst);
    }

    /// The next `times` commits are refused with a retryable error, the way
    /// a store refuses a transaction an older one has wounded.
    pub fn abort_commits(&self, times: u32) {
        self.commit_aborts.store(times, Ordering::SeqCst);
    }

    pub fn fail_rollbacks(&self, times: u32) {
        self.rollback_faults.store(times, Ordering::SeqCst);
    }

    pub fn fail_begins(&self, times: u32) {
        self.begin_faults.store(times, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind == kind).count()
    }

    /// Calls made on connection `conn`, in order.
    pub fn calls_on(&self, conn: u64) -> Vec<StoreCall> {
        self.calls().into_iter().filter(|c| c.conn == conn).collect()
    }

    /// Distinct connection ids that issued a `Get` or `Put`.
    pub fn data_connections(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .calls()
            .iter()
            .filter(|c| matches!(c.kind, CallKind::Get(_) | CallKind::Put(_)))
            .map(|c| c.conn)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn record(&self, kind: CallKind, conn: &Connection, failed: bool) {
        self.calls.lock().unwrap().push(StoreCall {
            kind,
            conn: conn.id(),
            ts: conn.timestamp(),
            failed,
        });
    }

    fn take_table_fault(faults: &Mutex<BTreeMap<Table, u32>>, table: Table) -> bool {
        let mut faults = faults.lock().unwrap();
        match faults.get_mut(&table) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TransactionalStore for FaultInjectingStore {
    async fn connect(&self) -> Result<Arc<Connection>, StoreError> {
        let conn = self.inner.connect().await?;
        self.record(CallKind::Connect, &conn, false);
        Ok(conn)
    }

    async fn disconnect(&self, conn: &Connection) -> Result<(), StoreError> {
        let result = self.inner.disconnect(conn).await;
        self.record(CallKind::Disconnect, conn, result.is_err());
        result
    }

    async fn begin(&self, conn: &Connection) -> Result<(), StoreError> {
        if Self::take_fault(&self.begin_faults) {
            self.record(CallKind::Begin, conn, true);
            return Err(StoreError::permanent("begin", "injected begin failure"));
        }
        let result = self.inner.begin(conn).await;
        self.record(CallKind::Begin, conn, result.is_err());
        result
    }

    async fn commit(&self, conn: &Connection) -> Result<(), StoreError> {
        if Self::take_fault(&self.commit_faults) {
            self.record(CallKind::Commit, conn, true);
            return Err(StoreError::permanent("commit", "injected commit failure"));
        }
        if Self::take_fault(&self.commit_aborts) {
            self.record(CallKind::Commit, conn, true);
            return Err(StoreError::retryable("commit", "injected commit abort"));
        }
        let result = self.inner.commit(conn).await;
        self.record(CallKind::Commit, conn, result.is_err());
        result
    }

    async fn rollback(&self, conn: &Connection) -> Result<(), StoreError> {
        if Self::take_fault(&self.rollback_faults) {
            self.record(CallKind::Rollback, conn, true);
            return Err(StoreError::permanent("rollback", "injected rollback failure"));
        }
        let result = self.inner.rollback(conn).await;
        self.record(CallKind::Rollback, conn, result.is_err());
        result
    }

    async fn get(&self, conn: &Connection, table: Table, key: u64) -> Result<Option<String>, StoreError> {
        if Self::take_table_fault(&self.read_faults, table) {
            self.record(CallKind::Get(table), conn, true);
            return Err(StoreError::retryable("get", format!("injected fault on {table}[{key}]")));
        }
        let result = self.inner.get(conn, table, key).await;
        self.record(CallKind::Get(table), conn, result.is_err());
        result
    }

    async fn put(&self, conn: &Connection, table: Table, key: u64, value: String) -> Result<(), StoreError> {
        if Self::take_table_fault(&self.write_faults, table) {
            self.record(CallKind::Put(table), conn, true);
            return Err(StoreError::retryable("put", format!("injected fault on {table}[{key}]")));
        }
        let result = self.inner.put(conn, table, key, value).await;
        self.record(CallKind::Put(table), conn, result.is_err());
        result
    }
}
