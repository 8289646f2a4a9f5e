//! Metadata service client.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{check_status, ClientError};

/// Extra time allowed on top of a long-poll's `maxWait`.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

/// Cluster metadata service interface.
///
/// Documents are returned as opaque JSON; their shape belongs to the
/// scheduler, not to this client.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Current metadata version.
    async fn get_version(&self) -> Result<String, ClientError>;

    /// Block until the version differs from `version` or `max_wait` passes,
    /// returning the version seen last.
    async fn wait_for_change(&self, version: &str, max_wait: Duration)
        -> Result<String, ClientError>;

    /// Host documents known to metadata.
    async fn get_hosts(&self) -> Result<Vec<serde_json::Value>, ClientError>;
}

/// HTTP client for the metadata service.
#[derive(Debug, Clone)]
pub struct HttpMetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataClient {
    /// Create a client for a metadata API base URL, e.g.
    /// `http://rancher-metadata/2016-07-29`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("metadata url {base_url:?}: {e}")))?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("metadata http client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Base URL of the metadata API.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<String, ClientError> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "text/plain");
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = check_status(request.send().await?).await?;
        let body = response.text().await?;
        Ok(unquote(body.trim()).to_string())
    }
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
    async fn get_version(&self) -> Result<String, ClientError> {
        let url = format!("{}/version", self.base_url);
        self.get_text(&url, &[], None).await
    }

    async fn wait_for_change(
        &self,
        version: &str,
        max_wait: Duration,
    ) -> Result<String, ClientError> {
        let url = format!("{}/version", self.base_url);
        let max_wait_secs = max_wait.as_secs().to_string();
        let query = [
            ("wait", "true"),
            ("value", version),
            ("maxWait", max_wait_secs.as_str()),
        ];

        debug!(version, max_wait_secs = max_wait.as_secs(), "Waiting for metadata change");
        self.get_text(&url, &query, Some(max_wait + LONG_POLL_GRACE))
            .await
    }

    async fn get_hosts(&self) -> Result<Vec<serde_json::Value>, ClientError> {
        let url = format!("{}/hosts", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let hosts = check_status(response).await?.json().await?;
        Ok(hosts)
    }
}

/// The version endpoint may answer with a JSON string.
fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}
