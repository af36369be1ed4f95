//! Orchestration of the checkout activities.
//!
//! A [`Workflow`] is anything that can be executed as one unit. The checkout
//! plans ([`SequentialWorkflow`], [`ConcurrentWorkflow`]) run activities of a
//! [`Simulator`]; [`ConnectionLimited`] gates any workflow behind a bounded
//! number of concurrent executions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WorkflowError;
use crate::simulator::{Activity, Simulator};

mod concurrent;
mod limited;

pub use concurrent::{ConcurrentWorkflow, OPERATION_PHASE, VALIDATION_PHASE};
pub use limited::ConnectionLimited;

#[async_trait]
pub trait Workflow: Send + Sync {
    type Output: Send;

    async fn execute(&self) -> Self::Output;
}

#[async_trait]
impl<W: Workflow + ?Sized> Workflow for Box<W> {
    type Output = W::Output;

    async fn execute(&self) -> Self::Output {
        (**self).execute().await
    }
}

/// Body of one checkout attempt as seen by the retry controller.
pub type CheckoutWorkflow = dyn Workflow<Output = Result<(), WorkflowError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Sequential,
    #[default]
    Concurrent,
}

impl Strategy {
    /// Checkout plan of this strategy over `sim`.
    pub fn workflow(self, sim: Arc<dyn Simulator>) -> Box<CheckoutWorkflow> {
        match self {
            Strategy::Sequential => Box::new(SequentialWorkflow::new(sim)),
            Strategy::Concurrent => Box::new(ConcurrentWorkflow::new(sim)),
        }
    }
}

/// All nine activities one after another; the first error ends the run.
pub struct SequentialWorkflow {
    sim: Arc<dyn Simulator>,
}

impl SequentialWorkflow {
    pub fn new(sim: Arc<dyn Simulator>) -> Self {
        Self { sim }
    }
}

#[async_trait]
impl Workflow for SequentialWorkflow {
    type Output = Result<(), WorkflowError>;

    async fn execute(&self) -> Self::Output {
        for activity in Activity::ALL {
            debug!(activity = %activity, "running activity");
            self.sim.run(activity).await?;
        }
        Ok(())
    }
}
