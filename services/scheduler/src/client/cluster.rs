//! Cluster API client.
//!
//! Only the parts the supervisor needs: an authenticated check that the
//! credentials work, and an unauthenticated ping of the upstream server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, info};

use super::{check_status, ClientError};
use crate::config::CattleCredentials;

/// Reachability check against the upstream cluster control plane.
#[async_trait]
pub trait UpstreamProbe: Send + Sync {
    /// Succeeds when the upstream answered at all (any HTTP status).
    async fn ping(&self) -> Result<(), ClientError>;
}

/// Cluster API client.
#[derive(Debug, Clone)]
pub struct ClusterApiClient {
    client: reqwest::Client,
    base_url: Url,
    ping_url: Url,
    access_key: String,
    secret_key: String,
}

impl ClusterApiClient {
    /// Build a client without touching the network.
    pub fn new(credentials: &CattleCredentials, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("cluster api http client: {e}")))?;

        Ok(Self {
            client,
            ping_url: ping_url(&credentials.url),
            base_url: credentials.url.clone(),
            access_key: credentials.access_key.clone(),
            secret_key: credentials.secret_key.clone(),
        })
    }

    /// Build a client and verify the credentials against the API root.
    pub async fn connect(
        credentials: &CattleCredentials,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Self::new(credentials, timeout)?;

        debug!(url = %client.base_url, "Checking cluster API credentials");
        let response = client
            .client
            .get(client.base_url.clone())
            .basic_auth(&client.access_key, Some(&client.secret_key))
            .send()
            .await?;
        check_status(response).await?;

        info!(url = %client.base_url, "Connected to cluster API");
        Ok(client)
    }

    /// Cluster API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Upstream ping URL derived from the base URL.
    pub fn ping_url(&self) -> &Url {
        &self.ping_url
    }
}

#[async_trait]
impl UpstreamProbe for ClusterApiClient {
    async fn ping(&self) -> Result<(), ClientError> {
        let response = self.client.get(self.ping_url.clone()).send().await?;
        debug!(url = %self.ping_url, status = %response.status(), "Upstream ping answered");
        Ok(())
    }
}

/// Derive the ping URL by replacing the API version segment with `ping`.
///
/// `http://rancher:8080/v2-beta` becomes `http://rancher:8080/ping`.
pub fn ping_url(base: &Url) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().pop().push("ping");
    }
    url
}
