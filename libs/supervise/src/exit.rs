//! Fan-in of terminal errors from supervised subsystems.
//!
//! The first terminal error received is final. Remaining subsystems are not
//! stopped; the process is expected to exit once `wait` returns.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TerminalError;

const EXIT_CHANNEL_CAPACITY: usize = 8;

/// Name used when every sender went away without reporting.
pub const ORPHANED_SUBSYSTEM: &str = "supervision ended";

/// Sending half handed to each supervised subsystem.
#[derive(Debug, Clone)]
pub struct ExitSender {
    tx: mpsc::Sender<TerminalError>,
}

impl ExitSender {
    /// Report a terminal error. Never blocks the caller past the first
    /// report; later reports are dropped once the aggregator is gone.
    pub async fn report(&self, err: TerminalError) {
        if let Err(mpsc::error::SendError(err)) = self.tx.send(err).await {
            debug!(subsystem = %err.subsystem(), "Exit aggregator already closed, dropping terminal error");
        }
    }
}

/// Receives terminal errors from every supervised subsystem.
#[derive(Debug)]
pub struct ExitAggregator {
    tx: mpsc::Sender<TerminalError>,
    rx: mpsc::Receiver<TerminalError>,
}

impl Default for ExitAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExitAggregator {
    /// Create an aggregator with no registered subsystems.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(EXIT_CHANNEL_CAPACITY);
        Self { tx, rx }
    }

    /// Sender for one more subsystem.
    pub fn sender(&self) -> ExitSender {
        ExitSender {
            tx: self.tx.clone(),
        }
    }

    /// Block until the first terminal error arrives.
    ///
    /// If every sender is dropped without reporting, a synthetic terminal
    /// error is returned instead of waiting forever.
    pub async fn wait(self) -> TerminalError {
        let Self { tx, mut rx } = self;
        drop(tx);

        match rx.recv().await {
            Some(err) => err,
            None => TerminalError::exhausted(
                ORPHANED_SUBSYSTEM,
                0,
                anyhow::anyhow!("all supervised subsystems exited without reporting"),
            ),
        }
    }
}
