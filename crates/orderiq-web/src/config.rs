//! Environment configuration for the web server.
//!
//! Everything is read once from the process environment at startup.  An
//! Azure OpenAI deployment is preferred when its key is present; otherwise
//! an OpenAI-compatible endpoint is used.

use std::path::PathBuf;

use orderiq_adapters::{BarcodeClientConfig, LlmClientConfig, SearchClientConfig};

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

/// Bind address and port for the HTTP listener.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind_addr: String,
    pub port: u16,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub web: WebConfig,
    pub llm: LlmClientConfig,
    pub search: SearchClientConfig,
    /// Directory holding one `<database_name>.db` file per tenant.
    pub data_dir: PathBuf,
    /// Optional external schema file; the built-in schema is used otherwise.
    pub schema_path: Option<PathBuf>,
    /// Barcode lookup endpoint, when the sibling capability is enabled.
    pub barcode: Option<BarcodeClientConfig>,
}

impl AppConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let web = WebConfig {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0"),
            port: env_or("PORT", "8000")
                .parse()
                .map_err(|e| ConfigError(format!("invalid PORT: {e}")))?,
        };

        let llm = load_llm_config()?;

        let search = SearchClientConfig::new(
            require("SEARCH_ENDPOINT")?,
            require("SEARCH_API_KEY")?,
            env_or("SEARCH_INDEX", "workorder-examples"),
        );

        let data_dir = PathBuf::from(env_or("DATA_DIR", "data"));
        let schema_path = std::env::var("SCHEMA_PATH").ok().map(PathBuf::from);

        let barcode = match std::env::var("BARCODE_API_URL") {
            Ok(url) => {
                let identity_pem = match std::env::var("BARCODE_CLIENT_CERT_PEM") {
                    Ok(path) => Some(std::fs::read(&path).map_err(|e| {
                        ConfigError(format!("cannot read BARCODE_CLIENT_CERT_PEM `{path}`: {e}"))
                    })?),
                    Err(_) => None,
                };
                Some(BarcodeClientConfig { url, identity_pem })
            }
            Err(_) => None,
        };

        Ok(Self {
            web,
            llm,
            search,
            data_dir,
            schema_path,
            barcode,
        })
    }
}

/// Prefer an Azure OpenAI deployment, fall back to OpenAI-compatible.
fn load_llm_config() -> Result<LlmClientConfig, ConfigError> {
    if let Ok(api_key) = std::env::var("AZURE_OPENAI_API_KEY") {
        let endpoint = require("AZURE_OPENAI_ENDPOINT")?;
        let deployment = require("AZURE_OPENAI_DEPLOYMENT")?;
        let mut config = LlmClientConfig::azure(endpoint, api_key, deployment);
        if let Ok(version) = std::env::var("AZURE_OPENAI_API_VERSION") {
            config = config.with_api_version(version);
        }
        return Ok(config);
    }

    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        let model = env_or("OPENAI_MODEL", "gpt-4o");
        return Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(base) => LlmClientConfig::openai_compatible(api_key, model, base),
            Err(_) => LlmClientConfig::openai(api_key, model),
        });
    }

    Err(ConfigError(
        "set AZURE_OPENAI_API_KEY or OPENAI_API_KEY".into(),
    ))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn require(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError(format!("missing required env var {name}")))
}
