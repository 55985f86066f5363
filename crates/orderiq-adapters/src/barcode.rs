//! Barcode lookup.
//!
//! A sibling capability next to the question-answering pipeline: a barcode
//! value is pulled out of the user's message, looked up against the asset
//! API using a client certificate, and the API result is summarized for
//! the user with one model call.  Not reachable through natural-language
//! routing.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Value, json};
use tracing::debug;

use orderiq_pipeline::LanguageModel;

use crate::error::{AdapterError, Result};

/// Barcode values as they appear in user messages, e.g.
/// `barcode: pp5ban2mxh115og0`.
static BARCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)barcode\s*[:=]?\s*([A-Za-z0-9\-]+)").expect("valid barcode regex")
});

/// Configuration for the barcode lookup API.
#[derive(Debug, Clone)]
pub struct BarcodeClientConfig {
    /// Lookup endpoint URL.
    pub url: String,
    /// Client certificate and key as a PEM bundle, when the endpoint
    /// requires mutual TLS.
    pub identity_pem: Option<Vec<u8>>,
}

/// Client for the certificate-protected barcode lookup API.
pub struct BarcodeClient {
    config: BarcodeClientConfig,
    http: reqwest::Client,
    llm: Arc<dyn LanguageModel>,
}

impl BarcodeClient {
    pub fn new(config: BarcodeClientConfig, llm: Arc<dyn LanguageModel>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(std::time::Duration::from_secs(30));

        if let Some(pem) = &config.identity_pem {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|e| AdapterError::ConfigError(format!("invalid client identity: {e}")))?;
            builder = builder.identity(identity);
        }

        let http = builder
            .build()
            .map_err(|e| AdapterError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http, llm })
    }

    /// Pull the barcode value out of a user message, if present.
    pub fn extract_barcode(message: &str) -> Option<String> {
        BARCODE_RE
            .captures(message)
            .map(|c| c[1].to_owned())
    }

    /// Look a barcode up against the asset API.
    pub async fn lookup(&self, barcode: &str, token: &str) -> Result<Value> {
        debug!(barcode, "calling barcode lookup API");

        let resp = self
            .http
            .get(&self.config.url)
            .query(&[("Barcode", barcode)])
            .header("Accept", "application/json")
            .header("auth-token", token)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| AdapterError::RequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(AdapterError::RequestFailed {
                reason: format!("barcode API returned {status}: {text}"),
            });
        }

        // Non-JSON responses are wrapped rather than rejected.
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "data": text })))
    }

    /// Answer a barcode question end to end: extract the value, call the
    /// API, and summarize the result with one model call.  An API failure
    /// is summarized for the user instead of propagating.
    pub async fn answer(&self, message: &str, token: &str) -> Result<String> {
        let Some(barcode) = Self::extract_barcode(message) else {
            return Ok("Could not find a barcode value in your question.".to_owned());
        };

        let api_result = match self.lookup(&barcode, token).await {
            Ok(v) => v,
            Err(e) => json!({ "error": e.to_string() }),
        };

        let prompt = build_summary_prompt(message, &api_result);
        let response = self
            .llm
            .invoke(&prompt)
            .await
            .map_err(|e| AdapterError::RequestFailed {
                reason: e.to_string(),
            })?;

        Ok(response.trim().to_owned())
    }
}

fn build_summary_prompt(message: &str, api_result: &Value) -> String {
    format!(
        "You are an expert assistant for barcode lookup and validation.\n\
         Here is the data returned from the barcode API:\n\
         {api_result}\n\
         Summarize the result for the user in a clear, concise way. If there is an error, \
         explain it simply.\n\
         User Question:\n\
         {message}\n\
         \n\
         Answer:\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_barcode_values() {
        assert_eq!(
            BarcodeClient::extract_barcode("barcode pp5ban2mxh115og0").as_deref(),
            Some("pp5ban2mxh115og0")
        );
        assert_eq!(
            BarcodeClient::extract_barcode("look up Barcode: AB-123").as_deref(),
            Some("AB-123")
        );
        assert_eq!(
            BarcodeClient::extract_barcode("validate barcode=XYZ9").as_deref(),
            Some("XYZ9")
        );
        assert!(BarcodeClient::extract_barcode("how many welds are open?").is_none());
    }

    #[tokio::test]
    async fn answer_without_a_barcode_short_circuits() {
        use async_trait::async_trait;
        use orderiq_pipeline::InvokeError;

        struct UnusedModel;

        #[async_trait]
        impl LanguageModel for UnusedModel {
            async fn invoke(&self, _prompt: &str) -> std::result::Result<String, InvokeError> {
                panic!("the model must not be invoked without a barcode");
            }
        }

        let client = BarcodeClient::new(
            BarcodeClientConfig {
                url: "https://assets.example/api/lookup".into(),
                identity_pem: None,
            },
            Arc::new(UnusedModel),
        )
        .unwrap();

        let answer = client.answer("how many welds are open?", "tok").await.unwrap();
        assert_eq!(answer, "Could not find a barcode value in your question.");
    }

    #[test]
    fn summary_prompt_embeds_result_and_question() {
        let prompt = build_summary_prompt(
            "barcode pp5ban2mxh115og0",
            &json!({"AssetCategory": "Pipe"}),
        );
        assert!(prompt.contains("\"AssetCategory\":\"Pipe\""));
        assert!(prompt.contains("barcode pp5ban2mxh115og0"));
    }
}
