//! Metadata change watcher.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use cattle_supervise::SupervisedError;
use tracing::{debug, info, warn};

use crate::client::{MetadataClient, UpstreamProbe};
use crate::scheduler::Scheduler;

/// Default long-poll wait for a metadata version change.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

/// A watch session over cluster metadata.
#[async_trait]
pub trait MetadataWatcher: Send + Sync {
    /// Watch metadata and push changes into `scheduler`.
    ///
    /// Only returns on failure.
    async fn watch(
        &self,
        metadata: Arc<dyn MetadataClient>,
        scheduler: Arc<dyn Scheduler>,
        api: Arc<dyn UpstreamProbe>,
    ) -> Result<(), SupervisedError>;
}

/// Watches the metadata version and triggers a scheduler update per change.
#[derive(Debug, Clone)]
pub struct VersionWatcher {
    max_wait: Duration,
}

impl Default for VersionWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WAIT)
    }
}

impl VersionWatcher {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    async fn update(scheduler: &dyn Scheduler, version: &str) {
        match scheduler.update_with_metadata(false).await {
            Ok(_) => debug!(version, "Scheduler updated from metadata"),
            Err(e) => warn!(version, error = %e, "Scheduler update from metadata failed"),
        }
    }
}

#[async_trait]
impl MetadataWatcher for VersionWatcher {
    async fn watch(
        &self,
        metadata: Arc<dyn MetadataClient>,
        scheduler: Arc<dyn Scheduler>,
        api: Arc<dyn UpstreamProbe>,
    ) -> Result<(), SupervisedError> {
        api.ping()
            .await
            .context("cluster API unreachable")
            .map_err(SupervisedError::retryable)?;

        let mut version = metadata
            .get_version()
            .await
            .context("reading metadata version")
            .map_err(SupervisedError::retryable)?;
        info!(version = %version, "Watching metadata");

        Self::update(scheduler.as_ref(), &version).await;

        loop {
            let seen = metadata
                .wait_for_change(&version, self.max_wait)
                .await
                .context("waiting for metadata change")
                .map_err(SupervisedError::retryable)?;

            if seen != version {
                info!(from = %version, to = %seen, "Metadata version changed");
                version = seen;
                Self::update(scheduler.as_ref(), &version).await;
            }
        }
    }
}
