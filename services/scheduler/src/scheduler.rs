//! Scheduler handle shared by the event stream, metadata watcher and
//! reconciler.
//!
//! All writers go through one update mutex. Event application and watcher
//! updates wait for it; a forced resync only *tries* it and reports
//! `applied = false` when the scheduler is busy. That non-blocking try is
//! the busy signal the reconciler obeys.
//!
//! Host selection is not done here: host documents and event payloads are
//! kept as opaque JSON.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::client::{ClientError, MetadataClient};
use crate::events::ClusterEvent;

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No metadata client has been set.
    #[error("metadata client not configured")]
    MetadataUnavailable,

    /// Reading metadata failed.
    #[error("metadata: {0}")]
    Metadata(#[from] ClientError),

    /// The event could not be applied.
    #[error("event {name} rejected: {reason}")]
    EventRejected { name: String, reason: String },
}

/// Operations the supervisor performs on the scheduler.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Refresh the resource view from metadata.
    ///
    /// With `force = true` this never waits: if an update is in flight it
    /// returns `Ok(false)` (busy). Otherwise returns `Ok(true)` once applied.
    async fn update_with_metadata(&self, force: bool) -> Result<bool, SchedulerError>;

    /// Apply one event delivered by the event bus.
    async fn apply_event(&self, event: &ClusterEvent) -> Result<(), SchedulerError>;
}

/// Point-in-time copy of the scheduler's resource view.
#[derive(Debug, Clone, Default)]
pub struct ResourceView {
    /// Metadata version the view was built from.
    pub metadata_version: Option<String>,

    /// Host documents from metadata.
    pub hosts: Vec<serde_json::Value>,

    /// When the view was last loaded from metadata.
    pub synced_at: Option<Instant>,

    /// Events applied since startup.
    pub events_applied: u64,

    /// Name of the last applied event.
    pub last_event: Option<String>,
}

/// In-process scheduler handle.
pub struct ResourceScheduler {
    /// How long a non-forced update may reuse an unchanged view.
    reconcile_interval: Duration,

    metadata: RwLock<Option<Arc<dyn MetadataClient>>>,

    /// Held for the duration of every update.
    update_lock: Mutex<()>,

    view: RwLock<ResourceView>,
}

impl ResourceScheduler {
    /// Create a scheduler with the given reconcile interval in minutes.
    pub fn new(reconcile_interval_minutes: u64) -> Self {
        Self::with_interval(Duration::from_secs(
            reconcile_interval_minutes.saturating_mul(60),
        ))
    }

    /// Create a scheduler with an explicit reconcile interval.
    pub fn with_interval(reconcile_interval: Duration) -> Self {
        Self {
            reconcile_interval,
            metadata: RwLock::new(None),
            update_lock: Mutex::new(()),
            view: RwLock::new(ResourceView::default()),
        }
    }

    /// Set the metadata client used for updates.
    pub async fn set_metadata_client(&self, client: Arc<dyn MetadataClient>) {
        *self.metadata.write().await = Some(client);
    }

    pub fn reconcile_interval(&self) -> Duration {
        self.reconcile_interval
    }

    /// Copy of the current resource view.
    pub async fn snapshot(&self) -> ResourceView {
        self.view.read().await.clone()
    }

    async fn metadata_client(&self) -> Result<Arc<dyn MetadataClient>, SchedulerError> {
        self.metadata
            .read()
            .await
            .clone()
            .ok_or(SchedulerError::MetadataUnavailable)
    }

    /// Reload the view. Caller must hold `update_lock`.
    async fn reload(&self, force: bool) -> Result<(), SchedulerError> {
        let client = self.metadata_client().await?;
        let version = client.get_version().await?;

        if !force {
            let view = self.view.read().await;
            let fresh = view
                .synced_at
                .is_some_and(|at| at.elapsed() < self.reconcile_interval);
            if fresh && view.metadata_version.as_deref() == Some(version.as_str()) {
                debug!(version = %version, "Metadata unchanged, keeping resource view");
                return Ok(());
            }
        }

        let hosts = client.get_hosts().await?;
        let host_count = hosts.len();

        let mut view = self.view.write().await;
        view.metadata_version = Some(version.clone());
        view.hosts = hosts;
        view.synced_at = Some(Instant::now());
        drop(view);

        info!(version = %version, host_count, force, "Resource view synced with metadata");
        Ok(())
    }
}

#[async_trait]
impl Scheduler for ResourceScheduler {
    async fn update_with_metadata(&self, force: bool) -> Result<bool, SchedulerError> {
        let _guard = if force {
            match self.update_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    debug!("Scheduler busy, declining forced resync");
                    return Ok(false);
                }
            }
        } else {
            self.update_lock.lock().await
        };

        self.reload(force).await?;
        Ok(true)
    }

    async fn apply_event(&self, event: &ClusterEvent) -> Result<(), SchedulerError> {
        let _guard = self.update_lock.lock().await;

        if event.name.is_empty() {
            return Err(SchedulerError::EventRejected {
                name: event.id.clone(),
                reason: "event has no name".to_string(),
            });
        }

        let mut view = self.view.write().await;
        view.events_applied += 1;
        view.last_event = Some(event.name.clone());

        debug!(
            event_id = %event.id,
            event_name = %event.name,
            resource_type = ?event.resource_type,
            resource_id = ?event.resource_id,
            "Applied cluster event"
        );
        Ok(())
    }
}
