//! Runtime settings for the tabfeed pipeline
//!
//! Settings cover the boundary to the indexing engine only; everything that
//! shapes an individual import travels in the `ImportRequest` instead.

use crate::error::{Result, TabfeedError};
use serde::{Deserialize, Serialize};

// ============================================================================
// Settings Constants
// ============================================================================

/// Default Elasticsearch URL when not specified via environment variable.
pub const DEFAULT_ELASTIC_URL: &str = "http://localhost:9200";

/// Default timeout for requests to the indexing engine, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the Elasticsearch cluster
    pub elastic_url: String,

    /// Request timeout in seconds for bulk and administrative calls
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            elastic_url: DEFAULT_ELASTIC_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Create settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from environment variables
    ///
    /// Environment variables:
    /// - `TABFEED_ELASTIC_URL`: base URL of the cluster
    /// - `TABFEED_TIMEOUT_SECS`: request timeout in seconds
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("TABFEED_ELASTIC_URL") {
            if url.trim().is_empty() {
                return Err(TabfeedError::config("TABFEED_ELASTIC_URL is empty"));
            }
            settings.elastic_url = url;
        }

        if let Ok(secs) = std::env::var("TABFEED_TIMEOUT_SECS") {
            settings.timeout_secs = secs.parse().map_err(|_| {
                TabfeedError::config(format!("TABFEED_TIMEOUT_SECS is not a number: {}", secs))
            })?;
        }

        Ok(settings)
    }

    /// Get the cluster base URL without a trailing slash
    pub fn elastic_url(&self) -> &str {
        self.elastic_url.trim_end_matches('/')
    }
}
