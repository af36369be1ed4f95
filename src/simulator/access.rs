//! Table access strategies: how the keys of one read or write call are issued.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, StoreError};
use crate::store::{Connection, Table, TransactionalStore};

const WRITTEN_VALUE: &str = "value";

/// Read/write capability the activities are written against.
///
/// An empty key list is a no-op and never fails.
#[async_trait]
pub trait TableAccess: Send + Sync {
    async fn read_n(&self, table: Table, keys: &[u64]) -> Result<(), AccessError>;
    async fn write_n(&self, table: Table, keys: &[u64]) -> Result<(), AccessError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStrategy {
    Sequential,
    #[default]
    Concurrent,
}

impl AccessStrategy {
    /// Access bound to one connection's transaction.
    pub fn bind(self, store: Arc<dyn TransactionalStore>, conn: Arc<Connection>) -> Arc<dyn TableAccess> {
        match self {
            AccessStrategy::Sequential => Arc::new(SequentialAccess::new(store, conn)),
            AccessStrategy::Concurrent => Arc::new(ConcurrentAccess::new(store, conn)),
        }
    }
}

/// One operation at a time; the first failure ends the call.
pub struct SequentialAccess {
    store: Arc<dyn TransactionalStore>,
    conn: Arc<Connection>,
}

impl SequentialAccess {
    pub fn new(store: Arc<dyn TransactionalStore>, conn: Arc<Connection>) -> Self {
        Self { store, conn }
    }
}

#[async_trait]
impl TableAccess for SequentialAccess {
    async fn read_n(&self, table: Table, keys: &[u64]) -> Result<(), AccessError> {
        for &key in keys {
            self.store
                .get(&self.conn, table, key)
                .await
                .map_err(|e| AccessError::single(table, e))?;
        }
        Ok(())
    }

    async fn write_n(&self, table: Table, keys: &[u64]) -> Result<(), AccessError> {
        for &key in keys {
            self.store
                .put(&self.conn, table, key, WRITTEN_VALUE.to_string())
                .await
                .map_err(|e| AccessError::single(table, e))?;
        }
        Ok(())
    }
}

/// All operations of a call in flight together.
///
/// Every operation is awaited even after one fails; the call reports all
/// failures together.
pub struct ConcurrentAccess {
    store: Arc<dyn TransactionalStore>,
    conn: Arc<Connection>,
}

impl ConcurrentAccess {
    pub fn new(store: Arc<dyn TransactionalStore>, conn: Arc<Connection>) -> Self {
        Self { store, conn }
    }
}

fn collect_failures<T>(table: Table, results: Vec<Result<T, StoreError>>) -> Result<(), AccessError> {
    let failures: Vec<_> = results.into_iter().filter_map(Result::err).collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(AccessError::new(table, failures))
    }
}

#[async_trait]
impl TableAccess for ConcurrentAccess {
    async fn read_n(&self, table: Table, keys: &[u64]) -> Result<(), AccessError> {
        let results = join_all(keys.iter().map(|&key| self.store.get(&self.conn, table, key))).await;
        collect_failures(table, results)
    }

    async fn write_n(&self, table: Table, keys: &[u64]) -> Result<(), AccessError> {
        let results = join_all(
            keys.iter()
                .map(|&key| self.store.put(&self.conn, table, key, WRITTEN_VALUE.to_string())),
        )
        .await;
        collect_failures(table, results)
    }
}
