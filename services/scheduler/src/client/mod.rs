//! Clients for the services the scheduler depends on.
//!
//! - `metadata`: the cluster metadata service (versions, host documents)
//! - `cluster`: the cluster API (credentials check, upstream ping)

mod cluster;
mod metadata;

use thiserror::Error;

pub use cluster::{ping_url, ClusterApiClient, UpstreamProbe};
pub use metadata::{HttpMetadataClient, MetadataClient};

/// Errors from collaborator clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client could not be built from its configuration.
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// Transport-level failure (connect, timeout, decode).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

impl ClientError {
    /// True when the server rejected the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

/// Turn a non-success response into [`ClientError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status { url, status, body })
}
