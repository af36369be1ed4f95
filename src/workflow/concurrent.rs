use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::debug;

use super::Workflow;
use crate::error::{ActivityError, Phase, WorkflowError};
use crate::simulator::{Activity, Simulator};

pub const VALIDATION_PHASE: [Activity; 4] = [
    Activity::ValidateCheckout,
    Activity::ValidateAvailability,
    Activity::VerifyCustomer,
    Activity::ValidatePayment,
];

pub const OPERATION_PHASE: [Activity; 3] = [
    Activity::RecordOffer,
    Activity::CommitTax,
    Activity::DecrementInventory,
];

/// Validation phase, then operation phase, then `CompleteOrder`.
///
/// Activities of one phase run as parallel tasks. A phase is always joined in
/// full, so a failing activity never leaves siblings running past the phase
/// boundary.
pub struct ConcurrentWorkflow {
    sim: Arc<dyn Simulator>,
}

impl ConcurrentWorkflow {
    pub fn new(sim: Arc<dyn Simulator>) -> Self {
        Self { sim }
    }

    async fn run_phase(&self, phase: Phase, activities: &[Activity]) -> Result<(), WorkflowError> {
        debug!(phase = %phase, activities = activities.len(), "starting phase");
        let mut tasks = JoinSet::new();
        for &activity in activities {
            let sim = self.sim.clone();
            tasks.spawn(async move { sim.run(activity).await });
        }

        let mut failures: Vec<ActivityError> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(e),
                Err(e) => match e.try_into_panic() {
                    Ok(payload) => std::panic::resume_unwind(payload),
                    Err(e) => panic!("activity task of {phase} phase cancelled: {e}"),
                },
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::Phase { phase, failures })
        }
    }
}

#[async_trait]
impl Workflow for ConcurrentWorkflow {
    type Output = Result<(), WorkflowError>;

    async fn execute(&self) -> Self::Output {
        self.run_phase(Phase::Validation, &VALIDATION_PHASE).await?;
        self.run_phase(Phase::Operation, &OPERATION_PHASE).await?;
        self.sim.complete_order().await?;
        Ok(())
    }
}
