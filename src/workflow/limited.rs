use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::Workflow;

/// Admission gate bounding how many executions of the inner workflow are in
/// flight at once.
///
/// The permit is held for the whole execution and released when it finishes,
/// whether the inner workflow succeeded or not. Callers beyond the limit wait.
pub struct ConnectionLimited<W> {
    inner: W,
    gate: Arc<Semaphore>,
    limit: usize,
}

impl<W: Workflow> ConnectionLimited<W> {
    /// # Panics
    ///
    /// Panics if `limit` is zero.
    pub fn new(inner: W, limit: usize) -> Self {
        assert!(limit >= 1, "limit must be at least 1");
        Self {
            inner,
            gate: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits not currently held by an execution.
    pub fn available(&self) -> usize {
        self.gate.available_permits()
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }
}

#[async_trait]
impl<W: Workflow> Workflow for ConnectionLimited<W> {
    type Output = W::Output;

    async fn execute(&self) -> Self::Output {
        // the semaphore is never closed
        let _permit = self.gate.acquire().await.ok();
        self.inner.execute().await
    }
}
