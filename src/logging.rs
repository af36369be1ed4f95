//! Tracing setup and workflow-scoped log macros.
//!
//! The macros stamp every event with the `workflow_id` and `attempt` of the
//! transaction that emitted it, so interleaved output from many concurrent
//! workflows can be filtered per transaction.

/// Install a fmt subscriber honouring `RUST_LOG`, defaulting to `info`.
///
/// Safe to call many times; only the first installation wins.
pub fn init_tracing() {
    init_tracing_with("info");
}

/// Same as [`init_tracing`] with a caller-chosen fallback filter.
pub fn init_tracing_with(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init();
}

#[macro_export]
macro_rules! workflow_info {
    ($id:expr, $attempt:expr, $($arg:tt)+) => {
        ::tracing::info!(workflow_id = $id, attempt = $attempt, $($arg)+)
    };
}

#[macro_export]
macro_rules! workflow_warn {
    ($id:expr, $attempt:expr, $($arg:tt)+) => {
        ::tracing::warn!(workflow_id = $id, attempt = $attempt, $($arg)+)
    };
}

#[macro_export]
macro_rules! workflow_debug {
    ($id:expr, $attempt:expr, $($arg:tt)+) => {
        ::tracing::debug!(workflow_id = $id, attempt = $attempt, $($arg)+)
    };
}
