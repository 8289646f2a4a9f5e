//! Failure tiers for supervised operations.

use std::fmt;

use thiserror::Error;

/// Failure returned by one invocation of a supervised operation.
///
/// Supervised operations are expected to run forever, so every return is a
/// failure of some tier:
/// - `Retryable` consumes one unit of the retry budget.
/// - `Fatal` ends supervision immediately, whatever budget remains.
#[derive(Debug, Error)]
pub enum SupervisedError {
    /// Transient failure; the operation may be invoked again.
    #[error("{0:#}")]
    Retryable(anyhow::Error),

    /// Unrecovered fault; the operation must not be retried.
    #[error("fatal: {0:#}")]
    Fatal(anyhow::Error),
}

impl SupervisedError {
    /// Wrap a cause as a retryable failure.
    pub fn retryable(cause: impl Into<anyhow::Error>) -> Self {
        Self::Retryable(cause.into())
    }

    /// Wrap a cause as a fatal fault.
    pub fn fatal(cause: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(cause.into())
    }

    /// Returns true for the fatal tier.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Consume the error, returning its cause.
    pub fn into_cause(self) -> anyhow::Error {
        match self {
            Self::Retryable(cause) | Self::Fatal(cause) => cause,
        }
    }
}

/// How a supervised subsystem came to its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    /// Retry budget was used up by retryable failures.
    Exhausted,

    /// A fatal fault (explicit or panic) ended supervision.
    Fatal,
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("exhausted"),
            Self::Fatal => f.write_str("fatal"),
        }
    }
}

/// Unrecoverable end of a supervised subsystem.
///
/// Displayed as `"<subsystem>: <cause>"`, e.g.
/// `metadata watcher exited: connection refused`.
#[derive(Debug, Error)]
#[error("{subsystem}: {cause:#}")]
pub struct TerminalError {
    subsystem: String,
    kind: TerminalKind,
    attempts: u32,
    cause: anyhow::Error,
}

impl TerminalError {
    /// Terminal error for a subsystem whose retry budget ran out.
    pub fn exhausted(subsystem: impl Into<String>, attempts: u32, cause: anyhow::Error) -> Self {
        Self {
            subsystem: subsystem.into(),
            kind: TerminalKind::Exhausted,
            attempts,
            cause,
        }
    }

    /// Terminal error for a subsystem that hit a fatal fault.
    pub fn fatal(subsystem: impl Into<String>, attempts: u32, cause: anyhow::Error) -> Self {
        Self {
            subsystem: subsystem.into(),
            kind: TerminalKind::Fatal,
            attempts,
            cause,
        }
    }

    /// Name of the subsystem that ended.
    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn kind(&self) -> TerminalKind {
        self.kind
    }

    /// Number of invocations made before the subsystem ended.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The last underlying cause.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}
