//! Supervision primitives for long-running subsystems.
//!
//! A supervised subsystem is an operation that runs forever on success and
//! returns only on failure. This crate provides:
//!
//! - **Failure tiers**: [`SupervisedError::Retryable`] consumes retry budget,
//!   [`SupervisedError::Fatal`] (and any panic) ends supervision at once.
//! - **Bounded retry**: [`RetryRunner`] re-invokes the operation until
//!   `budget + 1` attempts have failed, with optional backoff in between.
//! - **Critical tasks**: [`spawn_critical`] reports a panic or return of a
//!   task that must run forever as a fatal [`TerminalError`].
//! - **Exit fan-in**: [`ExitAggregator`] yields the first [`TerminalError`]
//!   reported by any subsystem.
//!
//! # Invariants
//!
//! - Attempt counters are owned by a single runner and only increase.
//! - Fatal faults never consume retry budget.
//! - The first terminal error received by the aggregator is final.

mod backoff;
mod error;
mod exit;
mod retry;
mod supervisor;

pub use backoff::{BackoffPolicy, RetryPolicy, DEFAULT_MAX_RETRIES};
pub use error::{SupervisedError, TerminalError, TerminalKind};
pub use exit::{ExitAggregator, ExitSender, ORPHANED_SUBSYSTEM};
pub use retry::RetryRunner;
pub use supervisor::{spawn_critical, supervise};
