use std::sync::Arc;

use async_trait::async_trait;

use super::Simulator;
use crate::contention::LockPool;
use crate::error::ActivityError;

/// Runs every activity of the inner simulator while holding one lock from a
/// shared pool.
///
/// Decorators sharing one `Arc<LockPool>` contend with each other; the pool
/// outlives any single simulator.
pub struct ContentionSimulator {
    inner: Arc<dyn Simulator>,
    pool: Arc<LockPool>,
}

impl ContentionSimulator {
    pub fn new(inner: Arc<dyn Simulator>, pool: Arc<LockPool>) -> Self {
        Self { inner, pool }
    }
}

#[async_trait]
impl Simulator for ContentionSimulator {
    async fn validate_checkout(&self) -> Result<(), ActivityError> {
        self.pool.with_lock(self.inner.validate_checkout()).await
    }

    async fn validate_availability(&self) -> Result<(), ActivityError> {
        self.pool.with_lock(self.inner.validate_availability()).await
    }

    async fn verify_customer(&self) -> Result<(), ActivityError> {
        self.pool.with_lock(self.inner.verify_customer()).await
    }

    async fn validate_payment(&self) -> Result<(), ActivityError> {
        self.pool.with_lock(self.inner.validate_payment()).await
    }

    async fn validate_product_option(&self) -> Result<(), ActivityError> {
        self.pool.with_lock(self.inner.validate_product_option()).await
    }

    async fn record_offer(&self) -> Result<(), ActivityError> {
        self.pool.with_lock(self.inner.record_offer()).await
    }

    async fn commit_tax(&self) -> Result<(), ActivityError> {
        self.pool.with_lock(self.inner.commit_tax()).await
    }

    async fn decrement_inventory(&self) -> Result<(), ActivityError> {
        self.pool.with_lock(self.inner.decrement_inventory()).await
    }

    async fn complete_order(&self) -> Result<(), ActivityError> {
        self.pool.with_lock(self.inner.complete_order()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;
    use crate::simulator::Activity;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks how many activities are in flight at once.
    #[derive(Default)]
    struct Overlap {
        inside: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Overlap {
        async fn enter(&self) -> Result<(), ActivityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.inside.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Simulator for Overlap {
        async fn validate_checkout(&self) -> Result<(), ActivityError> {
            self.enter().await
        }
        async fn validate_availability(&self) -> Result<(), ActivityError> {
            self.enter().await
        }
        async fn verify_customer(&self) -> Result<(), ActivityError> {
            self.enter().await
        }
        async fn validate_payment(&self) -> Result<(), ActivityError> {
            self.enter().await
        }
        async fn validate_product_option(&self) -> Result<(), ActivityError> {
            self.enter().await
        }
        async fn record_offer(&self) -> Result<(), ActivityError> {
            self.enter().await
        }
        async fn commit_tax(&self) -> Result<(), ActivityError> {
            self.enter().await
        }
        async fn decrement_inventory(&self) -> Result<(), ActivityError> {
            self.enter().await
        }
        async fn complete_order(&self) -> Result<(), ActivityError> {
            Err(ActivityError::Business {
                activity: Activity::CompleteOrder,
            })
        }
    }

    #[tokio::test]
    async fn single_lock_serializes_every_activity() {
        let inner = Arc::new(Overlap::default());
        let pool = Arc::new(LockPool::new(1, SimRng::seeded(5)));
        let sim = ContentionSimulator::new(inner.clone(), pool);

        let all = Activity::ALL[..8].iter().map(|&a| sim.run(a));
        let results = futures::future::join_all(all).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 8);
        assert_eq!(inner.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inner_errors_pass_through_and_release_the_lock() {
        let pool = Arc::new(LockPool::new(1, SimRng::seeded(6)));
        let sim = ContentionSimulator::new(Arc::new(Overlap::default()), pool);
        assert!(sim.complete_order().await.unwrap_err().is_business());
        tokio::time::timeout(Duration::from_millis(200), sim.validate_checkout())
            .await
            .expect("lock was not released")
            .unwrap();
    }
}
