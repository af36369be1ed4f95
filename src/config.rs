//! Per-run shape parameters and simulation options.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rng::SimRng;
use crate::simulator::AccessStrategy;
use crate::store::in_memory::DEFAULT_LOCK_WAIT_TIMEOUT;
use crate::store::{InMemoryStore, Table};
use crate::transaction::RetryPolicy;
use crate::workflow::Strategy;
use crate::workload::DiskOptions;

pub const MAX_ORDER_ITEMS: u64 = 20;
pub const MAX_APPLIED_OFFERS: u64 = 10;
pub const MAX_PAYMENTS: u64 = 7;
/// Key space used when a non-positive one is requested.
pub const DEFAULT_KEY_SPACE: u64 = 10_000;

/// Work quantities of one checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub order_items: u64,
    pub sku_items: u64,
    pub applied_offers: u64,
    pub payments: u64,
}

impl RunConfiguration {
    pub fn new(order_items: u64, sku_items: u64, applied_offers: u64, payments: u64) -> Self {
        Self {
            order_items,
            sku_items,
            applied_offers,
            payments,
        }
    }

    /// Draw every quantity uniformly from `1..=MAX`.
    pub fn random(rng: &SimRng) -> Self {
        Self {
            order_items: rng.in_range(1, MAX_ORDER_ITEMS),
            sku_items: rng.in_range(1, MAX_ORDER_ITEMS),
            applied_offers: rng.in_range(1, MAX_APPLIED_OFFERS),
            payments: rng.in_range(1, MAX_PAYMENTS),
        }
    }

    /// Number of keys each table is accessed with in one attempt.
    pub fn keys_for(&self, table: Table) -> u64 {
        match table {
            Table::Orders | Table::Customers | Table::OrderTaxes => 1,
            Table::OrderPayments => self.payments,
            Table::Items
            | Table::StockKeepingUnits
            | Table::ItemOffers
            | Table::ItemOptions
            | Table::CustomerOffersUsage => self.order_items,
        }
    }
}

/// Pre-drawn keys per table for keyed access.
///
/// Keys are drawn with replacement, so one table's sequence may repeat a key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableAccessKeys {
    keys: BTreeMap<Table, Vec<u64>>,
}

impl TableAccessKeys {
    pub fn random(config: &RunConfiguration, key_space: u64, rng: &SimRng) -> Self {
        let key_space = if key_space < 1 { DEFAULT_KEY_SPACE } else { key_space };
        let keys = Table::ALL
            .iter()
            .map(|&table| {
                let drawn = (0..config.keys_for(table)).map(|_| rng.in_range(1, key_space)).collect();
                (table, drawn)
            })
            .collect();
        Self { keys }
    }

    pub fn from_map(keys: BTreeMap<Table, Vec<u64>>) -> Self {
        Self { keys }
    }

    pub fn get(&self, table: Table) -> &[u64] {
        self.keys.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Knobs of a simulation run, loadable from JSON.
///
/// Every field has a default, so `{}` is a valid options document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationOptions {
    /// How the activities of one workflow are scheduled
    pub workflow_strategy: Strategy,
    /// How the keys of one table access are issued
    pub access_strategy: AccessStrategy,
    /// Keys are drawn from `1..=key_space`
    pub key_space: u64,
    /// Draw all keys up front per attempt instead of per call
    pub keyed_access: bool,
    /// Percent chance (0-100) that a validating activity rejects the order
    pub business_error_probability: u8,
    /// Size of the contention lock pool; 0 disables contention
    pub lock_count: usize,
    /// Maximum in-flight workflow executions; 0 means unlimited
    pub connection_limit: usize,
    /// CPU cycles charged by ValidateCheckout
    pub checkout_cpu_cycles: u64,
    pub retry: RetryPolicy,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            workflow_strategy: Strategy::Concurrent,
            access_strategy: AccessStrategy::Concurrent,
            key_space: DEFAULT_KEY_SPACE,
            keyed_access: false,
            business_error_probability: 0,
            lock_count: 0,
            connection_limit: 0,
            checkout_cpu_cycles: 100,
            retry: RetryPolicy::default(),
            seed: None,
        }
    }
}

impl SimulationOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.business_error_probability > 100 {
            return Err(ConfigError::Probability(self.business_error_probability));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: SimulationOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Key space with the non-positive fallback applied.
    pub fn effective_key_space(&self) -> u64 {
        if self.key_space < 1 {
            DEFAULT_KEY_SPACE
        } else {
            self.key_space
        }
    }
}

/// How the bundled in-memory store is built for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Latency charged to every get and put; none when absent
    pub disk: Option<DiskOptions>,
    /// Longest wait of a younger transaction for a key held by an older one
    pub lock_wait_timeout_ms: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            disk: None,
            lock_wait_timeout_ms: DEFAULT_LOCK_WAIT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StoreOptions {
    pub fn build(&self, key_space: u64) -> InMemoryStore {
        let store = InMemoryStore::with_tables(key_space)
            .with_lock_wait_timeout(Duration::from_millis(self.lock_wait_timeout_ms));
        match &self.disk {
            Some(disk) => store.with_disk(disk.build()),
            None => store,
        }
    }
}
