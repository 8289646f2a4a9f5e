//! Spawning supervised subsystems.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::backoff::RetryPolicy;
use crate::error::{SupervisedError, TerminalError};
use crate::exit::ExitSender;
use crate::retry::{fault_from_join, RetryRunner};

/// Spawn `operation` under a fresh [`RetryRunner`] and report its terminal
/// error to `exit`.
///
/// `subsystem` is the name carried by the terminal error, e.g.
/// `"metadata watcher exited"`.
pub fn supervise<F, Fut>(
    subsystem: &'static str,
    policy: RetryPolicy,
    exit: ExitSender,
    operation: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), SupervisedError>> + Send + 'static,
{
    tokio::spawn(async move {
        info!(subsystem, budget = policy.budget, "Starting supervised subsystem");

        let mut runner = RetryRunner::new(subsystem, policy);
        let terminal = runner.run_until_exhausted(operation).await;
        exit.report(terminal).await;
    })
}

/// Spawn a task that is never retried and must never end.
///
/// If it panics or returns, a fatal terminal error named `subsystem` is
/// reported to `exit`.
pub fn spawn_critical<Fut>(
    subsystem: &'static str,
    exit: ExitSender,
    task: Fut,
) -> JoinHandle<()>
where
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let cause = match tokio::spawn(task).await {
            Ok(()) => anyhow::anyhow!("task returned"),
            Err(join_error) => fault_from_join(join_error),
        };

        error!(subsystem, error = %cause, "Critical task ended");
        exit.report(TerminalError::fatal(subsystem, 1, cause)).await;
    })
}
