//! Bounded-retry runner for long-running operations.
//!
//! The runner invokes an operation that only returns on failure. Each
//! invocation runs on its own task so that a panic inside the operation is
//! observed as a fatal fault instead of unwinding through the runner.

use std::any::Any;
use std::future::Future;

use tokio::task::JoinError;
use tracing::{debug, error, warn};

use crate::backoff::RetryPolicy;
use crate::error::{SupervisedError, TerminalError};

/// Runs one supervised operation until its retry budget is exhausted.
///
/// Owns the retry state (attempt counter) for exactly one subsystem.
#[derive(Debug)]
pub struct RetryRunner {
    subsystem: String,
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryRunner {
    /// Create a runner for the named subsystem.
    pub fn new(subsystem: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            subsystem: subsystem.into(),
            policy,
            attempts: 0,
        }
    }

    /// Subsystem name used in logs and the terminal error.
    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    /// Invocations made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Invoke `operation` until it fails fatally or fails retryably more
    /// than `budget` times after the first attempt.
    ///
    /// A normal `Ok` return is not expected from these operations and is
    /// counted as a retryable failure.
    pub async fn run_until_exhausted<F, Fut>(&mut self, mut operation: F) -> TerminalError
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), SupervisedError>> + Send + 'static,
    {
        loop {
            self.attempts += 1;
            let attempt = self.attempts;

            let cause = match tokio::spawn(operation()).await {
                Ok(Ok(())) => anyhow::anyhow!("operation returned without error"),
                Ok(Err(SupervisedError::Retryable(cause))) => cause,
                Ok(Err(SupervisedError::Fatal(cause))) => {
                    error!(
                        subsystem = %self.subsystem,
                        attempt,
                        error = %format!("{cause:#}"),
                        "Supervised operation hit a fatal fault"
                    );
                    return TerminalError::fatal(self.subsystem.clone(), attempt, cause);
                }
                Err(join_error) => {
                    let cause = fault_from_join(join_error);
                    error!(
                        subsystem = %self.subsystem,
                        attempt,
                        error = %cause,
                        "Supervised operation crashed"
                    );
                    return TerminalError::fatal(self.subsystem.clone(), attempt, cause);
                }
            };

            if attempt > self.policy.budget {
                error!(
                    subsystem = %self.subsystem,
                    attempts = attempt,
                    budget = self.policy.budget,
                    error = %format!("{cause:#}"),
                    "Supervised operation exceeded retry budget"
                );
                return TerminalError::exhausted(self.subsystem.clone(), attempt, cause);
            }

            let delay = self.policy.backoff.delay(attempt - 1);
            warn!(
                subsystem = %self.subsystem,
                attempt,
                budget = self.policy.budget,
                delay_ms = delay.as_millis() as u64,
                error = %format!("{cause:#}"),
                "Supervised operation failed, retrying"
            );

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            debug!(subsystem = %self.subsystem, attempt = attempt + 1, "Retrying supervised operation");
        }
    }
}

pub(crate) fn fault_from_join(err: JoinError) -> anyhow::Error {
    if err.is_panic() {
        anyhow::anyhow!("panicked: {}", panic_message(err.into_panic()))
    } else {
        anyhow::anyhow!("task cancelled")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
