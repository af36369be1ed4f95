//! Simulated transactional checkout workflows.
//!
//! Models a nine-step order checkout against a transactional key-value store
//! and compares execution strategies under contention and latency:
//!
//! * [`simulator`]: the activities, against a store or as pure latency
//! * [`workflow`]: sequential and phased-concurrent plans, admission gating
//! * [`transaction`]: commit, reject, or replay with a preserved timestamp
//! * [`contention`]: a pool of locks modelling shared-resource overhead
//! * [`store`]: the store contract plus in-memory and instrumented stores
//!
//! ```no_run
//! use std::sync::Arc;
//! use checkout_sim::{run_stress, StressConfig};
//!
//! # async fn demo() -> Result<(), checkout_sim::FatalError> {
//! let config = StressConfig::default();
//! let store = Arc::new(config.build_store());
//! let summary = run_stress(store, &config).await?;
//! println!("{} committed", summary.committed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod contention;
pub mod error;
pub mod logging;
pub mod rng;
pub mod simulator;
pub mod store;
pub mod stress;
pub mod transaction;
pub mod workflow;
pub mod workload;

pub use config::{RunConfiguration, SimulationOptions, StoreOptions, TableAccessKeys};
pub use contention::LockPool;
pub use error::{AccessError, ActivityError, ConfigError, FatalError, StoreError, WorkflowError};
pub use rng::SimRng;
pub use simulator::{AccessStrategy, Activity, LatencyMode, LatencySimulator, Simulator, StoreSimulator};
pub use store::{Connection, InMemoryStore, InstrumentedStore, Table, TransactionalStore};
pub use stress::{run_latency, run_stress, LatencyConfig, LatencySummary, StressConfig, StressSummary};
pub use transaction::{BackoffStrategy, RetryPolicy, TransactionalWorkflow, TxnOutcome};
pub use workflow::{ConnectionLimited, Strategy, Workflow};
pub use workload::{DiskKind, DiskOptions};
