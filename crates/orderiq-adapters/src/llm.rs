//! Chat-completion LLM client.
//!
//! Supports **Azure OpenAI deployments** and **OpenAI-compatible endpoints**
//! (OpenAI itself, Ollama, vLLM, …), non-streaming and single-turn: the
//! pipeline's language-model contract is one prompt in, one text response
//! out, with no conversation state retained across calls.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use orderiq_pipeline::{InvokeError, LanguageModel};

use crate::error::{AdapterError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Azure OpenAI API version.
const AZURE_API_VERSION: &str = "2024-12-01-preview";

// ---------------------------------------------------------------------------
// Provider enum
// ---------------------------------------------------------------------------

/// Identifies which chat-completion API surface the client targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Azure OpenAI deployments (`api-key` header, deployment in the URL).
    AzureOpenAI,
    /// OpenAI Chat Completions API (also covers OpenAI-compatible endpoints).
    OpenAI,
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to a single chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// Which provider this configuration targets.
    pub provider: LlmProvider,
    /// API key for authentication.
    pub api_key: String,
    /// Base URL: the Azure resource endpoint, or the OpenAI-style API base.
    pub base_url: String,
    /// Azure deployment name, or OpenAI model identifier.
    pub model: String,
    /// API version query parameter (Azure only).
    pub api_version: String,
    /// Maximum tokens per response.
    pub max_tokens: u32,
}

impl LlmClientConfig {
    /// Create a configuration for an Azure OpenAI deployment.
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            provider: LlmProvider::AzureOpenAI,
            api_key: api_key.into(),
            base_url: endpoint.into(),
            model: deployment.into(),
            api_version: AZURE_API_VERSION.to_owned(),
            max_tokens: 4096,
        }
    }

    /// Create a configuration for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_owned(),
            model: model.into(),
            api_version: String::new(),
            max_tokens: 4096,
        }
    }

    /// Create a configuration for any OpenAI-compatible API (e.g. Ollama,
    /// vLLM).
    pub fn openai_compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_version: String::new(),
            max_tokens: 4096,
        }
    }

    /// Override the Azure API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A blocking (from the pipeline's point of view), single-turn chat client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: Arc<LlmClientConfig>,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            let provider = match config.provider {
                LlmProvider::AzureOpenAI => "azure-openai",
                LlmProvider::OpenAI => "openai",
            };
            return Err(AdapterError::MissingApiKey {
                provider: provider.into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| AdapterError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// Send one prompt as a single user message and return the model's text.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let url = self.request_url();
        let body = self.build_request_body(prompt);
        let headers = self.build_headers()?;

        tracing::debug!(url = %url, model = %self.config.model, "sending LLM request");

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| AdapterError::RequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(AdapterError::RequestFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| AdapterError::ResponseParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        parse_chat_response(&v)
    }

    /// The chat-completions endpoint for the configured provider.
    fn request_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match self.config.provider {
            LlmProvider::AzureOpenAI => format!(
                "{base}/openai/deployments/{}/chat/completions?api-version={}",
                self.config.model, self.config.api_version
            ),
            LlmProvider::OpenAI => format!("{base}/chat/completions"),
        }
    }

    /// Build the JSON body for the chat completions call.
    fn build_request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.config.max_tokens,
        });

        // Azure infers the model from the deployment in the URL.
        if self.config.provider == LlmProvider::OpenAI {
            body["model"] = json!(self.config.model);
        }

        body
    }

    /// Authentication headers: `api-key` for Azure, `Bearer` otherwise.
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match self.config.provider {
            LlmProvider::AzureOpenAI => {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(&self.config.api_key).map_err(|e| {
                        AdapterError::ConfigError(format!("invalid API key header: {e}"))
                    })?,
                );
            }
            LlmProvider::OpenAI => {
                let auth = format!("Bearer {}", self.config.api_key);
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&auth).map_err(|e| {
                        AdapterError::ConfigError(format!("invalid authorization header: {e}"))
                    })?,
                );
            }
        }

        Ok(headers)
    }
}

/// Parse a chat-completions response into the assistant's text content.
fn parse_chat_response(v: &Value) -> Result<String> {
    v["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| AdapterError::ResponseParseFailed {
            reason: "missing `choices[0].message.content` in response".into(),
        })
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn invoke(&self, prompt: &str) -> std::result::Result<String, InvokeError> {
        self.complete(prompt)
            .await
            .map_err(|e| InvokeError::new(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn azure_config_construction() {
        let config = LlmClientConfig::azure("https://acme.openai.azure.com", "key", "gpt-4o");
        assert_eq!(config.provider, LlmProvider::AzureOpenAI);
        assert_eq!(config.api_version, AZURE_API_VERSION);
        assert_eq!(config.max_tokens, 4096);
    }

    #[test]
    fn azure_request_url_embeds_deployment_and_version() {
        let config = LlmClientConfig::azure("https://acme.openai.azure.com/", "key", "gpt-4o")
            .with_api_version("2024-06-01");
        let client = LlmClient::new(config).unwrap();
        assert_eq!(
            client.request_url(),
            "https://acme.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn openai_request_url() {
        let client = LlmClient::new(LlmClientConfig::openai("sk-test", "gpt-4o")).unwrap();
        assert_eq!(
            client.request_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn openai_compatible_uses_custom_base() {
        let config =
            LlmClientConfig::openai_compatible("local", "llama3", "http://localhost:11434/v1");
        let client = LlmClient::new(config).unwrap();
        assert_eq!(
            client.request_url(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn empty_api_key_returns_error() {
        let result = LlmClient::new(LlmClientConfig::openai("", "gpt-4o"));
        assert!(matches!(result, Err(AdapterError::MissingApiKey { .. })));
    }

    #[test]
    fn body_carries_single_user_message() {
        let client = LlmClient::new(LlmClientConfig::openai("sk", "gpt-4o")).unwrap();
        let body = client.build_request_body("how many welds?");

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "how many welds?");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn azure_body_omits_model() {
        let client =
            LlmClient::new(LlmClientConfig::azure("https://x.example", "k", "dep")).unwrap();
        let body = client.build_request_body("q");
        assert!(body.get("model").is_none());
    }

    #[test]
    fn parse_chat_response_extracts_content() {
        let v = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "SQL-Only"}}]
        });
        assert_eq!(parse_chat_response(&v).unwrap(), "SQL-Only");
    }

    #[test]
    fn parse_chat_response_rejects_missing_content() {
        let v = serde_json::json!({"choices": []});
        assert!(parse_chat_response(&v).is_err());
    }
}
