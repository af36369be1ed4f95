//! Error taxonomy for the simulated checkout.
//!
//! * [`StoreError`]: a single failed store call, classified retryable or permanent.
//! * [`AccessError`]: every store failure observed by one `read_n`/`write_n` call.
//! * [`ActivityError`]: outcome of one activity: a business rejection or a system fault.
//! * [`WorkflowError`]: why an attempt failed: its workflow body or an aborted commit.
//! * [`FatalError`]: the transaction boundary itself failed; the run cannot continue.

use std::fmt;

use thiserror::Error;

use crate::simulator::Activity;
use crate::store::Table;

/// Store-level error with retry classification.
///
/// **Retryable**: lock conflicts, busy connections, transient I/O.
/// **Permanent**: unknown connection, no active transaction, misuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// Operation that failed (e.g. "get", "commit")
    pub operation: String,
    pub message: String,
    pub retryable: bool,
}

impl StoreError {
    pub fn retryable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

impl std::error::Error for StoreError {}

/// Aggregated failures of one multi-key table access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessError {
    pub table: Table,
    pub failures: Vec<StoreError>,
}

impl AccessError {
    pub fn new(table: Table, failures: Vec<StoreError>) -> Self {
        Self { table, failures }
    }

    pub fn single(table: Table, failure: StoreError) -> Self {
        Self {
            table,
            failures: vec![failure],
        }
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.table)?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { " " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AccessError {}

/// Outcome of a failed activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    /// Expected validation failure. Terminal: the order is rejected.
    #[error("business rule rejected {activity}")]
    Business { activity: Activity },
    /// Transient store fault. Retryable.
    #[error("{activity} failed: {source}")]
    System {
        activity: Activity,
        #[source]
        source: AccessError,
    },
}

impl ActivityError {
    pub fn activity(&self) -> Activity {
        match self {
            Self::Business { activity } | Self::System { activity, .. } => *activity,
        }
    }

    pub fn is_business(&self) -> bool {
        matches!(self, Self::Business { .. })
    }
}

/// Concurrent phases of the checkout plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Validation,
    Operation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => f.write_str("validation"),
            Self::Operation => f.write_str("operation"),
        }
    }
}

/// Error returned by a workflow body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Activity(#[from] ActivityError),
    /// Every failure of one concurrent phase, in completion order.
    #[error("{phase} phase failed: {}", join_errors(.failures))]
    Phase {
        phase: Phase,
        failures: Vec<ActivityError>,
    },
    /// The store refused to commit a finished body with a retryable error.
    #[error("commit aborted: {0}")]
    Aborted(#[source] StoreError),
}

impl WorkflowError {
    /// True when any contained failure is a business rejection.
    pub fn is_business(&self) -> bool {
        self.failures().iter().any(ActivityError::is_business)
    }

    pub fn failures(&self) -> &[ActivityError] {
        match self {
            Self::Activity(e) => std::slice::from_ref(e),
            Self::Phase { failures, .. } => failures,
            Self::Aborted(_) => &[],
        }
    }
}

fn join_errors(failures: &[ActivityError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Unrecoverable failure at the transaction boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fatal {stage} failure (workflow {workflow_id}): {source}")]
pub struct FatalError {
    pub workflow_id: u64,
    pub stage: TxnStage,
    #[source]
    pub source: StoreError,
}

/// Transaction boundary step that produced a [`FatalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStage {
    Connect,
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TxnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connect => "connect",
            Self::Begin => "begin",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// Invalid simulation options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("business_error_probability must be within 0..=100, got {0}")]
    Probability(u8),
    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid options json: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(activity: Activity) -> ActivityError {
        ActivityError::System {
            activity,
            source: AccessError::single(Table::Orders, StoreError::retryable("get", "lock conflict")),
        }
    }

    #[test]
    fn store_error_classification() {
        let retryable = StoreError::retryable("get", "lock conflict");
        assert!(retryable.is_retryable());
        let permanent = StoreError::permanent("commit", "no active transaction");
        assert!(!permanent.is_retryable());
        assert_eq!(permanent.to_string(), "commit: no active transaction");
        assert_ne!(retryable, StoreError::permanent("get", "lock conflict"));
    }

    #[test]
    fn access_error_lists_every_failure() {
        let err = AccessError::new(
            Table::Items,
            vec![
                StoreError::retryable("get", "conflict on 3"),
                StoreError::retryable("get", "conflict on 9"),
            ],
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Items:"), "{msg}");
        assert!(msg.contains("conflict on 3") && msg.contains("conflict on 9"), "{msg}");
    }

    #[test]
    fn phase_error_is_business_if_any_member_is() {
        let only_system = WorkflowError::Phase {
            phase: Phase::Validation,
            failures: vec![system(Activity::ValidateCheckout), system(Activity::VerifyCustomer)],
        };
        assert!(!only_system.is_business());

        let mixed = WorkflowError::Phase {
            phase: Phase::Validation,
            failures: vec![
                system(Activity::ValidateCheckout),
                ActivityError::Business {
                    activity: Activity::ValidatePayment,
                },
            ],
        };
        assert!(mixed.is_business());
        assert_eq!(mixed.failures().len(), 2);
        assert!(mixed.to_string().starts_with("validation phase failed"));
    }

    #[test]
    fn aborted_commit_is_never_business() {
        let err = WorkflowError::Aborted(StoreError::retryable("commit", "transaction wounded by older connection 3"));
        assert!(!err.is_business());
        assert!(err.failures().is_empty());
        assert!(err.to_string().starts_with("commit aborted"), "{err}");
    }

    #[test]
    fn single_activity_error_converts() {
        let err: WorkflowError = ActivityError::Business {
            activity: Activity::CompleteOrder,
        }
        .into();
        assert!(err.is_business());
        assert_eq!(err.failures()[0].activity(), Activity::CompleteOrder);
    }
}
