//! Contract of the transactional key-value store the checkout runs against.
//!
//! The workflow engine treats the store as a black box: it connects, drives a
//! transaction through begin/commit/rollback and issues asynchronous gets and
//! puts against named tables. Consistency and isolation are the store's
//! business.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub mod in_memory;
pub mod instrumented;

pub use in_memory::InMemoryStore;
pub use instrumented::{InstrumentedStore, StoreStats, TableStats};

/// Logical tables touched by the checkout activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Table {
    Orders,
    Items,
    StockKeepingUnits,
    Customers,
    ItemOffers,
    OrderPayments,
    ItemOptions,
    CustomerOffersUsage,
    OrderTaxes,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::Orders,
        Table::Items,
        Table::StockKeepingUnits,
        Table::Customers,
        Table::ItemOffers,
        Table::OrderPayments,
        Table::ItemOptions,
        Table::CustomerOffersUsage,
        Table::OrderTaxes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Orders => "Orders",
            Table::Items => "Items",
            Table::StockKeepingUnits => "StockKeepingUnits",
            Table::Customers => "Customers",
            Table::ItemOffers => "ItemOffers",
            Table::OrderPayments => "OrderPayments",
            Table::ItemOptions => "ItemOptions",
            Table::CustomerOffersUsage => "CustomerOffersUsage",
            Table::OrderTaxes => "OrderTaxes",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle for one client connection.
///
/// Carries the logical timestamp of the connection's current transaction.
/// The store assigns it on `begin`; callers may overwrite it to replay a
/// transaction with its original snapshot ordering.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    timestamp: AtomicU64,
}

impl Connection {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            timestamp: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }

    pub fn set_timestamp(&self, ts: u64) {
        self.timestamp.store(ts, Ordering::SeqCst);
    }
}

/// Transactional key-value store consumed by the workflow engine.
///
/// Handles are shared (`Arc<Connection>`) because one transaction may have
/// several gets and puts in flight at once.
#[async_trait::async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn connect(&self) -> Result<std::sync::Arc<Connection>, StoreError>;

    async fn disconnect(&self, conn: &Connection) -> Result<(), StoreError>;

    /// Start a transaction and stamp `conn` with a fresh logical timestamp.
    async fn begin(&self, conn: &Connection) -> Result<(), StoreError>;

    async fn commit(&self, conn: &Connection) -> Result<(), StoreError>;

    async fn rollback(&self, conn: &Connection) -> Result<(), StoreError>;

    async fn get(&self, conn: &Connection, table: Table, key: u64) -> Result<Option<String>, StoreError>;

    async fn put(&self, conn: &Connection, table: Table, key: u64, value: String) -> Result<(), StoreError>;
}
