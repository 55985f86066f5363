//! Vector-similarity example retrieval.
//!
//! Thin REST client for a hosted search index holding question/query
//! examples.  The pipeline asks for the single nearest example per
//! question; an empty result list is a valid outcome, not an error.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use orderiq_pipeline::{ExampleSearch, RetrievedExample, SearchError};

use crate::error::{AdapterError, Result};

/// Default search REST API version.
const SEARCH_API_VERSION: &str = "2023-11-01";

/// Configuration for the hosted search index.
#[derive(Debug, Clone)]
pub struct SearchClientConfig {
    /// Service endpoint, e.g. `https://acme.search.windows.net`.
    pub endpoint: String,
    /// Query API key.
    pub api_key: String,
    /// Index name holding the stored examples.
    pub index: String,
    /// REST API version query parameter.
    pub api_version: String,
}

impl SearchClientConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            index: index.into(),
            api_version: SEARCH_API_VERSION.to_owned(),
        }
    }
}

/// REST client for the example search index.
#[derive(Debug, Clone)]
pub struct VectorSearchClient {
    config: SearchClientConfig,
    http: reqwest::Client,
}

impl VectorSearchClient {
    pub fn new(config: SearchClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AdapterError::MissingApiKey {
                provider: "search".into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AdapterError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    /// Return the text content of the `top` documents nearest to `text`.
    pub async fn nearest(&self, text: &str, top: usize) -> Result<Vec<String>> {
        let url = self.request_url();
        let body = json!({ "search": text, "top": top });

        debug!(index = %self.config.index, top, "querying example index");

        let resp = self
            .http
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| AdapterError::RequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(AdapterError::RequestFailed {
                reason: format!("search API returned {status}: {text}"),
            });
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| AdapterError::ResponseParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        Ok(parse_documents(&v))
    }

    fn request_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index,
            self.config.api_version
        )
    }
}

/// Pull the retrievable text content out of each result document.
///
/// Documents store their text under `content` (or `page_content` in
/// indexes populated by older ingestion jobs); documents without either
/// field are skipped.
fn parse_documents(v: &Value) -> Vec<String> {
    v["value"]
        .as_array()
        .map(|docs| {
            docs.iter()
                .filter_map(|doc| {
                    doc["content"]
                        .as_str()
                        .or_else(|| doc["page_content"].as_str())
                        .map(str::to_owned)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ExampleSearch for VectorSearchClient {
    async fn search(
        &self,
        text: &str,
        k: usize,
    ) -> std::result::Result<Vec<RetrievedExample>, SearchError> {
        let documents = self
            .nearest(text, k)
            .await
            .map_err(|e| SearchError::new(e.to_string()))?;

        Ok(documents
            .into_iter()
            .map(|content| RetrievedExample { content })
            .collect())
    }
}
