//! HTTP client for the Elasticsearch boundary
//!
//! Three calls cover everything the pipeline needs: the root-path ping that
//! carries the cluster version, the pre-import index delete, and the bulk
//! endpoint itself. One client (and its connection pool) is shared across all
//! batches of an import.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tabfeed_common::config::Settings;
use tabfeed_common::{Result, TabfeedError};
use tracing::debug;

pub mod monitor;

pub use monitor::{ClusterMonitor, ClusterStatus};

/// How much of an error body is carried into the error chain.
const ERROR_BODY_LIMIT: usize = 512;

/// Client for the indexing engine's administrative and bulk endpoints.
#[derive(Debug, Clone)]
pub struct ElasticClient {
    client: Client,
    base_url: String,
}

impl ElasticClient {
    /// Create a client from settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.elastic_url().to_string(),
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(&Settings::from_env()?)
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET the cluster root and extract `version.number`.
    pub async fn ping(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        body["version"]["number"]
            .as_str()
            .map(|version| version.to_string())
            .ok_or_else(|| {
                TabfeedError::ElasticResponse("root response carries no version.number".to_string())
            })
    }

    /// DELETE an index before importing into it.
    ///
    /// An absent index is success: the point is that the index is gone.
    pub async fn delete_index(&self, index: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, index);
        let response = self.client.delete(&url).send().await?;
        let status = response.status();

        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(index, status = status.as_u16(), "cleared index");
            return Ok(());
        }

        Err(TabfeedError::ElasticRejected {
            status: status.as_u16(),
            body: truncated_body(response).await,
        })
    }

    /// Submit one bulk payload for the given index.
    ///
    /// The payload is the newline-delimited action/document body built by the
    /// writer; this call owns nothing of the format beyond the content type.
    pub async fn bulk(&self, index: &str, payload: String) -> Result<()> {
        let url = format!("{}/{}/_bulk", self.base_url, index);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        Err(TabfeedError::ElasticRejected {
            status: status.as_u16(),
            body: truncated_body(response).await,
        })
    }
}

async fn truncated_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    clip_body(&mut body);
    body
}

/// Cap an error body at the carry limit. Bodies echo indexed documents, so
/// the limit can land inside a multi-byte character; the cut backs up to the
/// nearest character boundary.
fn clip_body(body: &mut String) {
    if body.len() <= ERROR_BODY_LIMIT {
        return;
    }
    let mut cut = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body.push_str("...");
}
