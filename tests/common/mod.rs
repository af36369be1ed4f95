// Not every test file uses every helper.
#![allow(dead_code)]

pub mod fault_injection;
pub mod tracing_capture;

use checkout_sim::store::{Connection, InMemoryStore, InstrumentedStore, TransactionalStore};
use checkout_sim::{RunConfiguration, SimulationOptions};
use std::sync::Arc;

/// Three order items, one payment: small enough to count every table access by hand.
pub fn scenario_config() -> RunConfiguration {
    RunConfiguration::new(3, 3, 1, 1)
}

/// Deterministic options with no business failures.
pub fn seeded_options(seed: u64) -> SimulationOptions {
    SimulationOptions {
        seed: Some(seed),
        key_space: 1_000,
        ..SimulationOptions::default()
    }
}

/// In-memory store behind a call counter.
pub fn counted_store(key_space: u64) -> (Arc<InMemoryStore>, Arc<InstrumentedStore>) {
    let inner = Arc::new(InMemoryStore::with_tables(key_space));
    let counted = Arc::new(InstrumentedStore::new(inner.clone()));
    (inner, counted)
}

/// Fresh connection with an open transaction.
pub async fn open_txn(store: &dyn TransactionalStore) -> Arc<Connection> {
    let conn = store.connect().await.expect("connect");
    store.begin(&conn).await.expect("begin");
    conn
}
