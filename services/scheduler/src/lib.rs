//! Cattle resource scheduler supervisor.
//!
//! Keeps the scheduler's view of cluster resources current and exposes a
//! health probe. Four subsystems run for the life of the process:
//!
//! - **Event stream**: applies cluster events from the event bus
//! - **Metadata watcher**: pushes metadata version changes into the scheduler
//! - **Health check**: `GET /healthcheck` on the configured port
//! - **Reconciler**: forces a full resync every period
//!
//! The first three run under bounded retry; when one of them gives up, the
//! process exits with its terminal error. The reconciler never exits.

pub mod app;
pub mod client;
pub mod config;
pub mod events;
pub mod health;
pub mod reconciler;
pub mod scheduler;
pub mod watcher;
