use std::process::ExitCode;
use std::sync::Arc;

use checkout_sim::error::ConfigError;
use checkout_sim::logging::init_tracing;
use checkout_sim::{run_latency, run_stress, LatencyConfig, StressConfig};

/// `checkout-sim [CONFIG]` runs transactional stress,
/// `checkout-sim latency [CONFIG]` runs latency-only checkouts.
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let mut args = std::env::args().skip(1).peekable();
    if args.peek().map(String::as_str) == Some("latency") {
        args.next();
        return match load(args.next(), |path| LatencyConfig::from_file(path)) {
            Some(config) => {
                let summary = run_latency(&config).await;
                println!(
                    "executions={} wall_ms_per_execution={:.2} mean_execution_ms={:.2}",
                    summary.executions,
                    summary.wall_ms_per_execution(),
                    summary.mean_execution_ms()
                );
                ExitCode::SUCCESS
            }
            None => ExitCode::from(2),
        };
    }

    let Some(config) = load(args.next(), |path| StressConfig::from_file(path)) else {
        return ExitCode::from(2);
    };
    let store = Arc::new(config.build_store());
    match run_stress(store, &config).await {
        Ok(summary) => {
            println!(
                "committed={} rejected={} exhausted={} attempts={} cancelled_tasks={}",
                summary.committed, summary.rejected, summary.exhausted, summary.attempts, summary.cancelled_tasks
            );
            ExitCode::SUCCESS
        }
        Err(fatal) => {
            tracing::error!(error = %fatal, "fatal transaction failure");
            ExitCode::FAILURE
        }
    }
}

/// Config from `path`, or the default when no path was given.
fn load<C: Default>(path: Option<String>, from_file: fn(&str) -> Result<C, ConfigError>) -> Option<C> {
    let Some(path) = path else {
        return Some(C::default());
    };
    match from_file(&path) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::error!(path = %path, error = %e, "could not load config");
            None
        }
    }
}
