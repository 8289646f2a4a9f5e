//! Health check endpoint.
//!
//! `GET /healthcheck` probes both collaborators on every request:
//!
//! | upstream | metadata | response                                       |
//! |----------|----------|------------------------------------------------|
//! | down     | any      | 404 `cluster control-plane unreachable`        |
//! | up       | down     | 404 `metadata and name resolution unreachable` |
//! | up       | up       | 200 `ok`                                       |

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use cattle_supervise::SupervisedError;
use tracing::{error, info};

use crate::client::{MetadataClient, UpstreamProbe};

/// Path of the health endpoint.
pub const HEALTHCHECK_PATH: &str = "/healthcheck";

pub const UPSTREAM_UNREACHABLE: &str = "cluster control-plane unreachable";
pub const METADATA_UNREACHABLE: &str = "metadata and name resolution unreachable";

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub metadata_reachable: bool,
    pub upstream_reachable: bool,
}

impl HealthSnapshot {
    /// Map the probe outcome to the HTTP response. Upstream takes precedence.
    pub fn response(&self) -> (StatusCode, &'static str) {
        if !self.upstream_reachable {
            (StatusCode::NOT_FOUND, UPSTREAM_UNREACHABLE)
        } else if !self.metadata_reachable {
            (StatusCode::NOT_FOUND, METADATA_UNREACHABLE)
        } else {
            (StatusCode::OK, "ok")
        }
    }
}

/// Collaborators probed by the health endpoint.
#[derive(Clone)]
pub struct HealthState {
    pub metadata: Arc<dyn MetadataClient>,
    pub upstream: Arc<dyn UpstreamProbe>,
}

impl HealthState {
    pub fn new(metadata: Arc<dyn MetadataClient>, upstream: Arc<dyn UpstreamProbe>) -> Self {
        Self { metadata, upstream }
    }

    /// Probe both collaborators. Neither check short-circuits the other.
    pub async fn probe(&self) -> HealthSnapshot {
        let (metadata, upstream) = tokio::join!(self.metadata.get_version(), self.upstream.ping());

        if metadata.is_err() || upstream.is_err() {
            error!(
                metadata_error = metadata.as_ref().err().map(|e| e.to_string()),
                upstream_error = upstream.as_ref().err().map(|e| e.to_string()),
                "Health check failed"
            );
        }

        HealthSnapshot {
            metadata_reachable: metadata.is_ok(),
            upstream_reachable: upstream.is_ok(),
        }
    }
}

/// Build the health check router.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route(HEALTHCHECK_PATH, get(healthcheck))
        .with_state(state)
}

async fn healthcheck(State(state): State<HealthState>) -> impl IntoResponse {
    state.probe().await.response()
}

/// Serve the health endpoint on `0.0.0.0:port` until the server fails.
///
/// Bind and serve failures are retryable.
pub async fn serve(port: u16, state: HealthState) -> Result<(), SupervisedError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding health check listener on {addr}"))
        .map_err(SupervisedError::retryable)?;
    info!(addr = %addr, path = HEALTHCHECK_PATH, "Health check listening");

    axum::serve(listener, router(state))
        .await
        .context("health check server failed")
        .map_err(SupervisedError::retryable)?;

    Err(SupervisedError::retryable(anyhow::anyhow!(
        "health check server stopped"
    )))
}
