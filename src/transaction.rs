//! Transaction retry controller.
//!
//! Wraps one checkout workflow in a store transaction. A clean run commits; a
//! business rejection rolls back and ends the transaction; any other failure
//! rolls back and replays the whole workflow on a fresh connection that
//! carries the first attempt's logical timestamp. A commit the store refuses
//! with a retryable error is replayed the same way; any other commit failure
//! is fatal. Because the store orders conflicts by the timestamp, a replayed
//! transaction only gets older relative to its competitors and eventually wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{RunConfiguration, SimulationOptions, TableAccessKeys};
use crate::contention::LockPool;
use crate::error::{FatalError, StoreError, TxnStage, WorkflowError};
use crate::rng::SimRng;
use crate::simulator::{ContentionSimulator, KeySource, Simulator, StoreSimulator};
use crate::store::{Connection, TransactionalStore};
use crate::workflow::{CheckoutWorkflow, Workflow};
use crate::{workflow_debug, workflow_info, workflow_warn};

/// Delay between a failed attempt and its replay.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Replay immediately.
    #[default]
    None,
    Fixed {
        delay_ms: u64,
    },
    /// `base_ms * attempt`, capped at `max_ms`.
    Linear {
        base_ms: u64,
        max_ms: u64,
    },
    /// `base_ms * multiplier^(attempt - 1)`, capped at `max_ms`.
    Exponential {
        base_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
}

impl BackoffStrategy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::None => Duration::ZERO,
            BackoffStrategy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffStrategy::Linear { base_ms, max_ms } => {
                Duration::from_millis(base_ms.saturating_mul(u64::from(attempt)).min(*max_ms))
            }
            BackoffStrategy::Exponential {
                base_ms,
                multiplier,
                max_ms,
            } => {
                if *base_ms == 0 {
                    return Duration::ZERO;
                }
                let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let ms = (*base_ms as f64) * multiplier.powi(exp);
                if !ms.is_finite() || ms >= *max_ms as f64 {
                    Duration::from_millis(*max_ms)
                } else {
                    Duration::from_millis(ms.max(0.0) as u64)
                }
            }
        }
    }
}

/// How often a failed transaction is replayed and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first; `None` retries until success.
    pub max_attempts: Option<u32>,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// # Panics
    ///
    /// Panics if `max_attempts` is zero.
    pub fn new(max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");
        Self {
            max_attempts: Some(max_attempts),
            backoff: BackoffStrategy::None,
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether another attempt may follow attempt number `attempt`.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }
}

/// How a transactional checkout ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TxnOutcome {
    Committed {
        attempts: u32,
        timestamp: u64,
    },
    /// A validating activity rejected the order; the transaction was rolled back.
    Rejected {
        attempts: u32,
        timestamp: u64,
        error: WorkflowError,
    },
    /// The retry policy ran out of attempts; the last attempt was rolled back.
    Exhausted {
        attempts: u32,
        timestamp: u64,
        error: WorkflowError,
    },
}

impl TxnOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Committed { attempts, .. } | Self::Rejected { attempts, .. } | Self::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Logical timestamp shared by every attempt of the transaction.
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Committed { timestamp, .. }
            | Self::Rejected { timestamp, .. }
            | Self::Exhausted { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Checkout workflow run inside a store transaction with replay on system errors.
///
/// One instance can be executed many times, concurrently; every execution is
/// an independent transaction with its own workflow id. Executions share the
/// instance's lock pool, so they contend with each other.
pub struct TransactionalWorkflow {
    store: Arc<dyn TransactionalStore>,
    options: SimulationOptions,
    pool: Option<Arc<LockPool>>,
    fixed_config: Option<RunConfiguration>,
    rng: SimRng,
    next_id: AtomicU64,
}

impl TransactionalWorkflow {
    pub fn new(store: Arc<dyn TransactionalStore>, options: SimulationOptions) -> Self {
        let rng = SimRng::from_seed_option(options.seed);
        let pool = (options.lock_count > 0).then(|| Arc::new(LockPool::new(options.lock_count, rng.fork())));
        Self {
            store,
            options,
            pool,
            fixed_config: None,
            rng,
            next_id: AtomicU64::new(0),
        }
    }

    /// Contend on `pool` instead of a pool sized from the options.
    pub fn with_lock_pool(mut self, pool: Arc<LockPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Use `config` for every attempt instead of drawing a fresh one.
    pub fn with_run_configuration(mut self, config: RunConfiguration) -> Self {
        self.fixed_config = Some(config);
        self
    }

    pub fn lock_pool(&self) -> Option<&Arc<LockPool>> {
        self.pool.as_ref()
    }

    /// Simulator stack and workflow body for one attempt on `conn`.
    fn attempt_body(&self, conn: &Arc<Connection>, business_error_probability: u8, rng: &SimRng) -> Box<CheckoutWorkflow> {
        let access = self.options.access_strategy.bind(self.store.clone(), conn.clone());
        let config = self.fixed_config.unwrap_or_else(|| RunConfiguration::random(rng));
        let key_space = self.options.effective_key_space();
        let keys = if self.options.keyed_access {
            KeySource::Planned(TableAccessKeys::random(&config, key_space, rng))
        } else {
            KeySource::Random { key_space }
        };

        let sim = StoreSimulator::new(access, config, keys, rng.fork())
            .with_business_error_probability(business_error_probability)
            .with_checkout_cpu_cycles(self.options.checkout_cpu_cycles);
        let sim: Arc<dyn Simulator> = match &self.pool {
            Some(pool) if pool.is_enabled() => Arc::new(ContentionSimulator::new(Arc::new(sim), pool.clone())),
            _ => Arc::new(sim),
        };
        self.options.workflow_strategy.workflow(sim)
    }

    async fn open(&self, id: u64) -> Result<Arc<Connection>, FatalError> {
        let conn = self.store.connect().await.map_err(fatal(id, TxnStage::Connect))?;
        self.store.begin(&conn).await.map_err(fatal(id, TxnStage::Begin))?;
        Ok(conn)
    }

    async fn close(&self, id: u64, attempt: u32, conn: &Connection) {
        if let Err(e) = self.store.disconnect(conn).await {
            workflow_warn!(id, attempt, connection = conn.id(), error = %e, "disconnect failed");
        }
    }

    async fn run(&self) -> Result<TxnOutcome, FatalError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let rng = self.rng.fork();

        let mut attempt: u32 = 1;
        let mut conn = self.open(id).await?;
        let timestamp = conn.timestamp();
        workflow_debug!(id, attempt, timestamp, connection = conn.id(), "transaction started");

        loop {
            // validation outcome is decided by the first attempt
            let probability = if attempt == 1 {
                self.options.business_error_probability
            } else {
                0
            };
            let body = self.attempt_body(&conn, probability, &rng);

            let error = match body.execute().await {
                Ok(()) => match self.store.commit(&conn).await {
                    Ok(()) => {
                        self.close(id, attempt, &conn).await;
                        workflow_debug!(id, attempt, timestamp, "transaction committed");
                        return Ok(TxnOutcome::Committed {
                            attempts: attempt,
                            timestamp,
                        });
                    }
                    // wounded by an older transaction
                    Err(e) if e.is_retryable() => WorkflowError::Aborted(e),
                    Err(e) => return Err(fatal(id, TxnStage::Commit)(e)),
                },
                Err(error) => error,
            };

            self.store.rollback(&conn).await.map_err(fatal(id, TxnStage::Rollback))?;
            self.close(id, attempt, &conn).await;

            if error.is_business() {
                workflow_info!(id, attempt, error = %error, "order rejected");
                return Ok(TxnOutcome::Rejected {
                    attempts: attempt,
                    timestamp,
                    error,
                });
            }
            if !self.options.retry.allows_retry_after(attempt) {
                workflow_warn!(id, attempt, error = %error, "retry attempts exhausted");
                return Ok(TxnOutcome::Exhausted {
                    attempts: attempt,
                    timestamp,
                    error,
                });
            }
            workflow_warn!(id, attempt, error = %error, "system error, replaying transaction");

            let delay = self.options.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            conn = self.open(id).await?;
            conn.set_timestamp(timestamp);
            attempt += 1;
        }
    }
}

#[async_trait]
impl Workflow for TransactionalWorkflow {
    type Output = Result<TxnOutcome, FatalError>;

    async fn execute(&self) -> Self::Output {
        self.run().await
    }
}

fn fatal(workflow_id: u64, stage: TxnStage) -> impl FnOnce(StoreError) -> FatalError {
    move |source| FatalError {
        workflow_id,
        stage,
        source,
    }
}
