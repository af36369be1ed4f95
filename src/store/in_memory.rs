//! In-memory transactional store.
//!
//! Every get or put takes an exclusive lock on its key for the rest of the
//! transaction. Conflicts are resolved with wound-wait on the connection's
//! logical timestamp:
//!
//! * an older transaction never waits. It wounds the younger holder, which
//!   loses its locks and pending writes on the spot, and takes the key.
//! * a younger transaction waits for an older holder, at most for the lock
//!   wait timeout, then fails with a retryable conflict.
//!
//! A wounded transaction fails every later get, put and commit with a
//! retryable error until it is rolled back. A replay that keeps its original
//! timestamp ages into the oldest transaction, and the oldest transaction
//! never blocks inside the store, so it always finishes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{Connection, Table, TransactionalStore};
use crate::error::StoreError;
use crate::workload::DiskAccess;

type Key = (Table, u64);

#[derive(Debug, Clone, Copy)]
struct LockHolder {
    conn: u64,
    ts: u64,
}

impl LockHolder {
    fn of(conn: &Connection) -> Self {
        Self {
            conn: conn.id(),
            ts: conn.timestamp(),
        }
    }

    /// Lower timestamp wins, connection id breaks ties.
    fn is_older_than(&self, other: &LockHolder) -> bool {
        (self.ts, self.conn) < (other.ts, other.conn)
    }
}

#[derive(Debug, Default)]
struct TxnState {
    writes: HashMap<Key, String>,
    held: HashSet<Key>,
    /// Connection of the older transaction that wounded this one.
    wounded_by: Option<u64>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<Table, HashMap<u64, String>>,
    connections: HashSet<u64>,
    txns: HashMap<u64, TxnState>,
    locks: HashMap<Key, LockHolder>,
}

impl State {
    fn release(&mut self, conn: u64) -> Option<TxnState> {
        let txn = self.txns.remove(&conn)?;
        for key in &txn.held {
            self.locks.remove(key);
        }
        Some(txn)
    }

    /// Abort `victim` in place: drop its locks and pending writes.
    fn wound(&mut self, victim: u64, by: u64) {
        let Some(txn) = self.txns.get_mut(&victim) else {
            return;
        };
        txn.wounded_by = Some(by);
        txn.writes.clear();
        for key in std::mem::take(&mut txn.held) {
            self.locks.remove(&key);
        }
    }

    fn txn_mut(&mut self, conn: u64, operation: &str) -> Result<&mut TxnState, StoreError> {
        let txn = self
            .txns
            .get_mut(&conn)
            .ok_or_else(|| StoreError::permanent(operation, "no active transaction"))?;
        match txn.wounded_by {
            Some(by) => Err(StoreError::retryable(
                operation,
                format!("transaction wounded by older connection {by}"),
            )),
            None => Ok(txn),
        }
    }
}

/// Default upper bound on how long a younger transaction waits for a key.
pub const DEFAULT_LOCK_WAIT_TIMEOUT: Duration = Duration::from_millis(20);

/// Store backed by process memory.
pub struct InMemoryStore {
    state: Mutex<State>,
    released: Notify,
    next_connection: AtomicU64,
    clock: AtomicU64,
    disk: Option<Arc<dyn DiskAccess>>,
    lock_wait_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            released: Notify::new(),
            next_connection: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            disk: None,
            lock_wait_timeout: DEFAULT_LOCK_WAIT_TIMEOUT,
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose nine checkout tables hold keys `0..=key_space`.
    pub fn with_tables(key_space: u64) -> Self {
        let mut state = State::default();
        for table in Table::ALL {
            let rows = (0..=key_space).map(|k| (k, "value".to_string())).collect();
            state.tables.insert(table, rows);
        }
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Charge `disk` latency to every get and put.
    pub fn with_disk(mut self, disk: Arc<dyn DiskAccess>) -> Self {
        self.disk = Some(disk);
        self
    }

    /// Longest time a younger transaction waits for a key before failing.
    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }

    pub fn lock_wait_timeout(&self) -> Duration {
        self.lock_wait_timeout
    }

    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    /// Committed value of a row, outside of any transaction.
    pub async fn committed_value(&self, table: Table, key: u64) -> Option<String> {
        let state = self.state.lock().await;
        state.tables.get(&table).and_then(|rows| rows.get(&key)).cloned()
    }

    /// Number of currently held key locks.
    pub async fn held_locks(&self) -> usize {
        self.state.lock().await.locks.len()
    }

    async fn charge_latency(&self) {
        if let Some(disk) = &self.disk {
            disk.access().await;
        }
    }

    /// Lock `key` for `conn` and return the state with the lock held.
    async fn lock_key(&self, conn: &Connection, operation: &str, key: Key) -> Result<MutexGuard<'_, State>, StoreError> {
        let me = LockHolder::of(conn);
        let deadline = Instant::now() + self.lock_wait_timeout;
        loop {
            let released = self.released.notified();
            {
                let mut state = self.state.lock().await;
                state.txn_mut(me.conn, operation)?;
                match state.locks.get(&key).copied() {
                    Some(holder) if holder.conn == me.conn => return Ok(state),
                    Some(holder) if !me.is_older_than(&holder) => {
                        trace!(conn = me.conn, holder = holder.conn, table = %key.0, key = key.1, "waiting for key lock");
                    }
                    holder => {
                        let mut wounded = false;
                        if let Some(holder) = holder {
                            debug!(conn = me.conn, victim = holder.conn, table = %key.0, key = key.1, "wounding younger transaction");
                            state.wound(holder.conn, me.conn);
                            wounded = true;
                        }
                        state.locks.insert(key, me);
                        state.txn_mut(me.conn, operation)?.held.insert(key);
                        if wounded {
                            self.released.notify_waiters();
                        }
                        return Ok(state);
                    }
                }
            }
            if tokio::time::timeout_at(deadline, released).await.is_err() {
                return Err(StoreError::retryable(
                    operation,
                    format!("lock wait timed out on {}[{}]", key.0, key.1),
                ));
            }
        }
    }
}

#[async_trait::async_trait]
impl TransactionalStore for InMemoryStore {
    async fn connect(&self) -> Result<Arc<Connection>, StoreError> {
        let id = self.next_connection.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.lock().await.connections.insert(id);
        Ok(Arc::new(Connection::new(id)))
    }

    async fn disconnect(&self, conn: &Connection) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.connections.remove(&conn.id()) {
            return Err(StoreError::permanent("disconnect", format!("unknown connection {}", conn.id())));
        }
        if state.release(conn.id()).is_some() {
            drop(state);
            self.released.notify_waiters();
        }
        Ok(())
    }

    async fn begin(&self, conn: &Connection) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.connections.contains(&conn.id()) {
            return Err(StoreError::permanent("begin", format!("unknown connection {}", conn.id())));
        }
        if state.txns.contains_key(&conn.id()) {
            return Err(StoreError::permanent("begin", "transaction already active"));
        }
        state.txns.insert(conn.id(), TxnState::default());
        conn.set_timestamp(self.clock.fetch_add(1, Ordering::SeqCst) + 1);
        Ok(())
    }

    async fn commit(&self, conn: &Connection) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        // a wounded transaction stays open until its rollback
        state.txn_mut(conn.id(), "commit")?;
        let txn = state
            .release(conn.id())
            .ok_or_else(|| StoreError::permanent("commit", "no active transaction"))?;
        for ((table, key), value) in txn.writes {
            state.tables.entry(table).or_default().insert(key, value);
        }
        drop(state);
        self.released.notify_waiters();
        Ok(())
    }

    async fn rollback(&self, conn: &Connection) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .release(conn.id())
            .ok_or_else(|| StoreError::permanent("rollback", "no active transaction"))?;
        drop(state);
        self.released.notify_waiters();
        Ok(())
    }

    async fn get(&self, conn: &Connection, table: Table, key: u64) -> Result<Option<String>, StoreError> {
        self.charge_latency().await;
        let mut state = self.lock_key(conn, "get", (table, key)).await?;
        let pending = state.txn_mut(conn.id(), "get")?.writes.get(&(table, key)).cloned();
        Ok(pending.or_else(|| state.tables.get(&table).and_then(|rows| rows.get(&key)).cloned()))
    }

    async fn put(&self, conn: &Connection, table: Table, key: u64, value: String) -> Result<(), StoreError> {
        self.charge_latency().await;
        let mut state = self.lock_key(conn, "put", (table, key)).await?;
        state.txn_mut(conn.id(), "put")?.writes.insert((table, key), value);
        Ok(())
    }
}
