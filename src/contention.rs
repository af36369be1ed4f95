//! Simulated shared-resource contention.
//!
//! A [`LockPool`] holds `N` independent binary locks. Each wrapped operation
//! picks one lock uniformly at random and holds it for its whole duration.
//! The lock is unrelated to the data the operation touches: the pool models
//! contention as overhead, and its size tunes the collision probability.

use std::future::Future;

use tokio::sync::Mutex;

use crate::rng::SimRng;

pub struct LockPool {
    locks: Vec<Mutex<()>>,
    rng: SimRng,
}

impl LockPool {
    /// A pool of `lock_count` locks. Zero disables contention entirely.
    pub fn new(lock_count: usize, rng: SimRng) -> Self {
        Self {
            locks: (0..lock_count).map(|_| Mutex::new(())).collect(),
            rng,
        }
    }

    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    pub fn is_enabled(&self) -> bool {
        !self.locks.is_empty()
    }

    /// Run `op` while holding one randomly chosen lock.
    ///
    /// The lock is released when `op` finishes, whatever it returns.
    pub async fn with_lock<F, T>(&self, op: F) -> T
    where
        F: Future<Output = T>,
    {
        if self.locks.is_empty() {
            return op.await;
        }
        let index = self.rng.below(self.locks.len());
        let _held = self.locks[index].lock().await;
        op.await
    }
}

impl std::fmt::Debug for LockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockPool").field("lock_count", &self.locks.len()).finish()
    }
}
