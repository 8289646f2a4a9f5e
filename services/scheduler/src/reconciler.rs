//! Periodic forced resync.
//!
//! Every period the reconciler asks the scheduler for a full resync from
//! metadata. A busy scheduler defers the cycle by [`BUSY_BACKOFF`]; an error
//! abandons it until the next period. The loop never ends on its own.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::scheduler::Scheduler;

/// Default time between forced resyncs.
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(180);

/// Delay before retrying a cycle the scheduler declined as busy.
pub const BUSY_BACKOFF: Duration = Duration::from_secs(5);

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between forced resyncs.
    pub period: Duration,

    /// Delay after a busy deferral.
    pub busy_backoff: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_RESYNC_PERIOD,
            busy_backoff: BUSY_BACKOFF,
        }
    }
}

/// How one reconcile cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The resync was applied after `deferrals` busy answers.
    Synced { deferrals: u32 },

    /// The resync failed; the cycle was abandoned.
    Failed,
}

/// Periodic resync loop.
pub struct Reconciler {
    scheduler: Arc<dyn Scheduler>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(scheduler: Arc<dyn Scheduler>, config: ReconcilerConfig) -> Self {
        Self { scheduler, config }
    }

    /// Run forever: sleep one period, then run a cycle.
    pub async fn run(self) {
        info!(
            period_secs = self.config.period.as_secs(),
            "Starting reconciliation loop"
        );

        loop {
            tokio::time::sleep(self.config.period).await;
            self.run_cycle().await;
        }
    }

    /// Request a forced resync, backing off while the scheduler is busy.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let mut deferrals = 0;

        loop {
            match self.scheduler.update_with_metadata(true).await {
                Ok(true) => {
                    info!(deferrals, "Forced resync complete");
                    return CycleOutcome::Synced { deferrals };
                }
                Ok(false) => {
                    deferrals += 1;
                    debug!(
                        deferrals,
                        backoff_secs = self.config.busy_backoff.as_secs(),
                        "Scheduler busy, deferring resync"
                    );
                    tokio::time::sleep(self.config.busy_backoff).await;
                }
                Err(e) => {
                    warn!(error = %e, "Forced resync failed, waiting for next period");
                    return CycleOutcome::Failed;
                }
            }
        }
    }
}
