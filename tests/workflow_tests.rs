//! Orchestration plans and the admission gate, end to end against a store.

use async_trait::async_trait;
use checkout_sim::error::Phase;
use checkout_sim::simulator::{AccessStrategy, KeySource, StoreSimulator};
use checkout_sim::store::{Table, TransactionalStore};
use checkout_sim::workflow::{ConnectionLimited, Strategy, Workflow};
use checkout_sim::{Activity, SimRng, WorkflowError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

mod common;
use common::fault_injection::{CallKind, FaultInjectingStore};
use common::{counted_store, open_txn, scenario_config};

fn simulator(store: Arc<dyn TransactionalStore>, conn: Arc<checkout_sim::Connection>) -> Arc<StoreSimulator> {
    let access = AccessStrategy::Concurrent.bind(store, conn);
    Arc::new(StoreSimulator::new(
        access,
        scenario_config(),
        KeySource::Random { key_space: 1_000 },
        SimRng::seeded(3),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_plan_matches_sequential_except_product_options() {
    let mut per_strategy = Vec::new();
    for strategy in [Strategy::Sequential, Strategy::Concurrent] {
        let (_inner, counted) = counted_store(1_000);
        let conn = open_txn(counted.as_ref()).await;
        strategy
            .workflow(simulator(counted.clone(), conn.clone()))
            .execute()
            .await
            .unwrap();
        counted.commit(&conn).await.unwrap();
        per_strategy.push(counted.stats());
    }

    let (sequential, concurrent) = (&per_strategy[0], &per_strategy[1]);
    for table in Table::ALL.into_iter().filter(|t| *t != Table::ItemOptions) {
        assert_eq!(sequential.table(table), concurrent.table(table), "{table}");
    }
    assert_eq!(sequential.table(Table::ItemOptions).reads, 3);
    assert_eq!(concurrent.table(Table::ItemOptions).reads, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_validation_still_lets_siblings_finish() {
    let store = Arc::new(FaultInjectingStore::with_tables(1_000));
    store.fail_reads(Table::Customers, 1);
    let conn = open_txn(store.as_ref()).await;

    let err = Strategy::Concurrent
        .workflow(simulator(store.clone(), conn))
        .execute()
        .await
        .unwrap_err();

    let WorkflowError::Phase { phase, failures } = &err else {
        panic!("expected a phase error, got {err:?}");
    };
    assert_eq!(*phase, Phase::Validation);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].activity(), Activity::VerifyCustomer);
    assert!(!err.is_business());

    // the other validations ran to completion
    assert_eq!(store.count(CallKind::Get(Table::Orders)), 1);
    assert_eq!(store.count(CallKind::Get(Table::StockKeepingUnits)), 3);
    assert_eq!(store.count(CallKind::Put(Table::OrderPayments)), 1);
    // and nothing past the phase boundary started
    assert_eq!(store.count(CallKind::Put(Table::CustomerOffersUsage)), 0);
    assert_eq!(store.count(CallKind::Put(Table::Orders)), 0);
}

#[tokio::test]
async fn failing_operation_phase_skips_completion() {
    let store = Arc::new(FaultInjectingStore::with_tables(1_000));
    store.fail_writes(Table::OrderTaxes, 1);
    let conn = open_txn(store.as_ref()).await;

    let err = Strategy::Concurrent
        .workflow(simulator(store.clone(), conn))
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Phase { phase: Phase::Operation, .. }));
    assert_eq!(store.count(CallKind::Put(Table::StockKeepingUnits)), 3);
    assert_eq!(store.count(CallKind::Put(Table::Orders)), 0);
}

#[derive(Default)]
struct InFlight {
    now: AtomicUsize,
    peak: AtomicUsize,
    done: AtomicUsize,
}

#[async_trait]
impl Workflow for InFlight {
    type Output = ();

    async fn execute(&self) -> Self::Output {
        let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.now.fetch_sub(1, Ordering::SeqCst);
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn connection_limit_bounds_in_flight_executions() {
    for limit in [1, 3, 8] {
        let gated = Arc::new(ConnectionLimited::new(InFlight::default(), limit));
        let mut callers = JoinSet::new();
        for _ in 0..limit * 10 {
            let gated = gated.clone();
            callers.spawn(async move { gated.execute().await });
        }
        while let Some(joined) = callers.join_next().await {
            joined.unwrap();
        }

        let tracker = gated.inner();
        assert!(tracker.peak.load(Ordering::SeqCst) <= limit, "limit {limit}");
        assert_eq!(tracker.done.load(Ordering::SeqCst), limit * 10);
        assert_eq!(gated.available(), limit);
    }
}
