//! Concurrent drivers: many checkouts executed in parallel tasks.
//!
//! [`run_stress`] drives transactional checkouts against a store;
//! [`run_latency`] drives latency-only checkouts and measures how long they
//! take.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::{RunConfiguration, SimulationOptions, StoreOptions};
use crate::contention::LockPool;
use crate::error::{ConfigError, FatalError, WorkflowError};
use crate::rng::SimRng;
use crate::simulator::{ContentionSimulator, LatencyMode, LatencySimulator, Simulator};
use crate::store::{InMemoryStore, TransactionalStore};
use crate::transaction::{TransactionalWorkflow, TxnOutcome};
use crate::workflow::{ConnectionLimited, Strategy, Workflow};
use crate::workload::{DiskKind, DiskOptions};

type TransactionalCheckout = dyn Workflow<Output = Result<TxnOutcome, FatalError>>;
type LatencyCheckout = dyn Workflow<Output = Result<(), WorkflowError>>;

/// Shape of a stress run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Concurrent tasks
    pub workflows: usize,
    /// Transactions each task runs back to back
    pub iterations: usize,
    pub options: SimulationOptions,
    /// Bundled store used by the binary
    pub store: StoreOptions,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            workflows: 10,
            iterations: 10,
            options: SimulationOptions::default(),
            store: StoreOptions::default(),
        }
    }
}

impl StressConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: StressConfig = serde_json::from_str(json)?;
        config.options.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// In-memory store sized to the options' key space.
    pub fn build_store(&self) -> InMemoryStore {
        self.store.build(self.options.effective_key_space())
    }
}

/// Outcome counts of a stress run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressSummary {
    pub committed: usize,
    pub rejected: usize,
    pub exhausted: usize,
    /// Attempts across all transactions, replays included
    pub attempts: u64,
    /// Tasks cancelled before reporting; their transactions are not counted
    pub cancelled_tasks: usize,
}

impl StressSummary {
    pub fn record(&mut self, outcome: &TxnOutcome) {
        match outcome {
            TxnOutcome::Committed { .. } => self.committed += 1,
            TxnOutcome::Rejected { .. } => self.rejected += 1,
            TxnOutcome::Exhausted { .. } => self.exhausted += 1,
        }
        self.attempts += u64::from(outcome.attempts());
    }

    pub fn merge(&mut self, other: StressSummary) {
        self.committed += other.committed;
        self.rejected += other.rejected;
        self.exhausted += other.exhausted;
        self.attempts += other.attempts;
        self.cancelled_tasks += other.cancelled_tasks;
    }

    pub fn transactions(&self) -> usize {
        self.committed + self.rejected + self.exhausted
    }

    /// Fold one finished task into the summary. Panics are re-raised.
    fn absorb(&mut self, joined: Result<Result<StressSummary, FatalError>, JoinError>) -> Result<(), FatalError> {
        match joined {
            Ok(part) => self.merge(part?),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!(error = %e, "stress task cancelled, its transactions are not counted");
                self.cancelled_tasks += 1;
            }
        }
        Ok(())
    }
}

/// Run `config.workflows` tasks of `config.iterations` transactions each.
///
/// All tasks share one lock pool and, when `connection_limit` is set, one
/// admission gate. The first fatal error cancels the remaining tasks and is
/// returned.
pub async fn run_stress(
    store: Arc<dyn TransactionalStore>,
    config: &StressConfig,
) -> Result<StressSummary, FatalError> {
    let started = Instant::now();
    let limit = config.options.connection_limit;
    let txn = TransactionalWorkflow::new(store, config.options.clone());
    let lock_count = txn.lock_pool().map_or(0, |pool| pool.lock_count());
    let checkout: Arc<TransactionalCheckout> = if limit > 0 {
        Arc::new(ConnectionLimited::new(txn, limit))
    } else {
        Arc::new(txn)
    };

    info!(
        workflows = config.workflows,
        iterations = config.iterations,
        strategy = ?config.options.workflow_strategy,
        access = ?config.options.access_strategy,
        lock_count,
        connection_limit = limit,
        "stress run started"
    );

    let mut tasks = JoinSet::new();
    for _ in 0..config.workflows {
        let checkout = checkout.clone();
        let iterations = config.iterations;
        tasks.spawn(async move {
            let mut summary = StressSummary::default();
            for _ in 0..iterations {
                summary.record(&checkout.execute().await?);
            }
            Ok::<_, FatalError>(summary)
        });
    }

    let mut summary = StressSummary::default();
    while let Some(joined) = tasks.join_next().await {
        if let Err(fatal) = summary.absorb(joined) {
            error!(error = %fatal, "stress run aborted");
            tasks.shutdown().await;
            return Err(fatal);
        }
    }

    info!(
        committed = summary.committed,
        rejected = summary.rejected,
        exhausted = summary.exhausted,
        attempts = summary.attempts,
        cancelled_tasks = summary.cancelled_tasks,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stress run finished"
    );
    Ok(summary)
}

/// Shape of a latency run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Concurrent tasks
    pub workflows: usize,
    /// Executions each task runs back to back
    pub iterations: usize,
    /// How units inside one activity are issued
    pub simulator: LatencyMode,
    pub workflow_strategy: Strategy,
    /// One disk shared by every execution
    pub disk: DiskOptions,
    /// Size of the contention lock pool; 0 disables contention
    pub lock_count: usize,
    /// Maximum in-flight executions; 0 means unlimited
    pub connection_limit: usize,
    /// Work quantities of every execution; drawn once per run when absent
    pub checkout: Option<RunConfiguration>,
    pub seed: Option<u64>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            workflows: 10,
            iterations: 10,
            simulator: LatencyMode::FanOut,
            workflow_strategy: Strategy::Concurrent,
            disk: DiskOptions {
                kind: DiskKind::Serialized,
                access_ms: 2,
            },
            lock_count: 0,
            connection_limit: 0,
            checkout: None,
            seed: None,
        }
    }
}

impl LatencyConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

/// Timing of a latency run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub executions: u64,
    /// Wall-clock time of the whole run
    pub elapsed_ms: u64,
    /// Sum of the individual execution times
    pub execution_ms: u64,
}

impl LatencySummary {
    /// Wall-clock time divided by the number of executions.
    pub fn wall_ms_per_execution(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.elapsed_ms as f64 / self.executions as f64
    }

    /// Mean time one execution took from start to finish.
    pub fn mean_execution_ms(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.execution_ms as f64 / self.executions as f64
    }
}

/// Run `config.workflows` tasks of `config.iterations` latency-only checkouts.
///
/// Every execution shares one simulator, one disk, one lock pool and, when
/// `connection_limit` is set, one admission gate.
pub async fn run_latency(config: &LatencyConfig) -> LatencySummary {
    let started = Instant::now();
    let rng = SimRng::from_seed_option(config.seed);
    let checkout = config.checkout.unwrap_or_else(|| RunConfiguration::random(&rng));

    let mut sim: Arc<dyn Simulator> = Arc::new(LatencySimulator::new(
        checkout,
        config.disk.build(),
        config.simulator,
        rng.fork(),
    ));
    let pool = Arc::new(LockPool::new(config.lock_count, rng.fork()));
    if pool.is_enabled() {
        sim = Arc::new(ContentionSimulator::new(sim, pool.clone()));
    }
    let plan = config.workflow_strategy.workflow(sim);
    let (plan, limit): (Arc<LatencyCheckout>, usize) = if config.connection_limit > 0 {
        let gated = ConnectionLimited::new(plan, config.connection_limit);
        let limit = gated.limit();
        (Arc::new(gated), limit)
    } else {
        (Arc::from(plan), 0)
    };

    info!(
        workflows = config.workflows,
        iterations = config.iterations,
        simulator = ?config.simulator,
        strategy = ?config.workflow_strategy,
        disk = ?config.disk.kind,
        access_ms = config.disk.access_ms,
        lock_count = pool.lock_count(),
        connection_limit = limit,
        "latency run started"
    );

    let mut tasks = JoinSet::new();
    for _ in 0..config.workflows {
        let plan = plan.clone();
        let iterations = config.iterations;
        tasks.spawn(async move {
            let mut part = LatencySummary::default();
            for _ in 0..iterations {
                let execution = Instant::now();
                // latency activities never fail
                let _ = plan.execute().await;
                part.executions += 1;
                part.execution_ms += execution.elapsed().as_millis() as u64;
            }
            part
        });
    }

    let mut summary = LatencySummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(part) => {
                summary.executions += part.executions;
                summary.execution_ms += part.execution_ms;
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => error!(error = %e, "latency task cancelled, its executions are not counted"),
        }
    }
    summary.elapsed_ms = started.elapsed().as_millis() as u64;

    info!(
        executions = summary.executions,
        wall_ms_per_execution = summary.wall_ms_per_execution(),
        mean_execution_ms = summary.mean_execution_ms(),
        "latency run finished"
    );
    summary
}
