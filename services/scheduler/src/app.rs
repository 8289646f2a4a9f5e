//! Process wiring: builds the collaborators and starts the supervised
//! subsystems.

use std::future::Future;
use std::io;
use std::sync::Arc;

use cattle_supervise::{
    spawn_critical, supervise, ExitAggregator, ExitSender, RetryPolicy, TerminalError,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::{
    ClientError, ClusterApiClient, HttpMetadataClient, MetadataClient, UpstreamProbe,
};
use crate::config::{Config, CLUSTER_API_TIMEOUT};
use crate::events::{CattleEventStream, EventStream};
use crate::health::{self, HealthState};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::scheduler::{ResourceScheduler, Scheduler};
use crate::watcher::{MetadataWatcher, VersionWatcher};

/// Terminal error name for the event stream subsystem.
pub const EVENT_SUBSCRIBER_EXITED: &str = "cattle event subscriber exited";

/// Terminal error name for the metadata watch subsystem.
pub const METADATA_WATCHER_EXITED: &str = "metadata watcher exited";

/// Terminal error name for the health check subsystem.
pub const HEALTHCHECK_DIED: &str = "healthcheck provider died";

/// Terminal error name for the reconciliation loop. It is not retried, so
/// any panic in it ends the process.
pub const RECONCILER_DIED: &str = "reconciler died";

/// Everything the supervised subsystems share.
#[derive(Clone)]
pub struct App {
    pub scheduler: Arc<dyn Scheduler>,
    pub metadata: Arc<dyn MetadataClient>,
    pub upstream: Arc<dyn UpstreamProbe>,
    pub events: Arc<dyn EventStream>,
    pub watcher: Arc<dyn MetadataWatcher>,
    pub retry: RetryPolicy,
    pub reconciler: ReconcilerConfig,
    pub health_check_port: u16,
}

impl App {
    /// Build the production collaborators.
    ///
    /// Fails if the cluster API rejects the credentials or cannot be reached;
    /// no subsystem is started in that case.
    pub async fn bootstrap(config: &Config) -> Result<Self, ClientError> {
        let metadata = Arc::new(HttpMetadataClient::new(config.metadata_url())?);
        let upstream =
            Arc::new(ClusterApiClient::connect(&config.cattle, CLUSTER_API_TIMEOUT).await?);

        let scheduler = Arc::new(ResourceScheduler::new(config.reconcile_interval_minutes));
        scheduler.set_metadata_client(metadata.clone()).await;

        info!(
            metadata_url = %metadata.base_url(),
            cluster_url = %upstream.base_url(),
            reconcile_interval_minutes = config.reconcile_interval_minutes,
            "Scheduler collaborators ready"
        );

        Ok(Self {
            scheduler,
            metadata,
            upstream,
            events: Arc::new(CattleEventStream::new(&config.cattle)),
            watcher: Arc::new(VersionWatcher::default()),
            retry: config.retry.clone(),
            reconciler: ReconcilerConfig {
                period: config.resync_period,
                ..ReconcilerConfig::default()
            },
            health_check_port: config.health_check_port,
        })
    }

    /// Start all subsystems. The returned aggregator yields the first
    /// terminal error.
    pub fn spawn(self) -> ExitAggregator {
        let exit = ExitAggregator::new();

        spawn_event_stream(&self, exit.sender());
        spawn_metadata_watcher(&self, exit.sender());
        spawn_health_check(&self, exit.sender());
        spawn_reconciler(&self, exit.sender());

        exit
    }
}

/// Supervise the event stream connection.
pub fn spawn_event_stream(app: &App, exit: ExitSender) -> JoinHandle<()> {
    let events = app.events.clone();
    let scheduler = app.scheduler.clone();

    supervise(EVENT_SUBSCRIBER_EXITED, app.retry.clone(), exit, move || {
        let events = events.clone();
        let scheduler = scheduler.clone();
        async move { events.connect(scheduler).await }
    })
}

/// Supervise the metadata watch session.
pub fn spawn_metadata_watcher(app: &App, exit: ExitSender) -> JoinHandle<()> {
    let watcher = app.watcher.clone();
    let metadata = app.metadata.clone();
    let scheduler = app.scheduler.clone();
    let upstream = app.upstream.clone();

    supervise(METADATA_WATCHER_EXITED, app.retry.clone(), exit, move || {
        let watcher = watcher.clone();
        let metadata = metadata.clone();
        let scheduler = scheduler.clone();
        let upstream = upstream.clone();
        async move { watcher.watch(metadata, scheduler, upstream).await }
    })
}

/// Run the reconciliation loop; a panic in it is reported as fatal.
pub fn spawn_reconciler(app: &App, exit: ExitSender) -> JoinHandle<()> {
    let reconciler = Reconciler::new(app.scheduler.clone(), app.reconciler.clone());
    spawn_critical(RECONCILER_DIED, exit, reconciler.run())
}

/// Supervise the health check server.
pub fn spawn_health_check(app: &App, exit: ExitSender) -> JoinHandle<()> {
    let state = HealthState::new(app.metadata.clone(), app.upstream.clone());
    let port = app.health_check_port;

    supervise(HEALTHCHECK_DIED, app.retry.clone(), exit, move || {
        health::serve(port, state.clone())
    })
}

/// Wait for the first terminal error or for `shutdown` to resolve.
///
/// Returns `None` on a clean shutdown. If the shutdown listener itself
/// fails, the failure is logged and only a terminal error ends the wait.
pub async fn run_until_exit<S>(exit: ExitAggregator, shutdown: S) -> Option<TerminalError>
where
    S: Future<Output = io::Result<()>>,
{
    let terminal = exit.wait();
    tokio::pin!(terminal);

    tokio::select! {
        terminal = &mut terminal => return Some(terminal),
        signal = shutdown => match signal {
            Ok(()) => return None,
            Err(e) => warn!(
                error = %e,
                "Unable to listen for shutdown signal, running until a subsystem fails"
            ),
        },
    }

    Some(terminal.await)
}
