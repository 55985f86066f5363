//! OrderIQ server binary.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use orderiq_adapters::{
    BarcodeClient, LlmClient, PopplerExtractor, TenantTokenDecoder, VectorSearchClient,
};
use orderiq_pipeline::{DomainContext, LanguageModel, Pipeline};
use orderiq_web::{AppConfig, AppState, WebServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment first, then logging, then config.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;

    let llm: Arc<dyn LanguageModel> =
        Arc::new(LlmClient::new(config.llm.clone()).context("building LLM client")?);
    let search = Arc::new(
        VectorSearchClient::new(config.search.clone()).context("building search client")?,
    );
    let extractor = Arc::new(PopplerExtractor::new());
    let tenants = Arc::new(TenantTokenDecoder);

    let context = match &config.schema_path {
        Some(path) => Arc::new(
            DomainContext::load(path)
                .with_context(|| format!("loading schema from {}", path.display()))?,
        ),
        None => Arc::new(DomainContext::builtin()),
    };

    let pipeline = Pipeline::new(
        llm.clone(),
        search,
        extractor,
        tenants.clone(),
        context,
        config.data_dir.clone(),
    );

    let barcode = match config.barcode.clone() {
        Some(barcode_config) => Some(
            BarcodeClient::new(barcode_config, llm).context("building barcode client")?,
        ),
        None => None,
    };

    let state = AppState {
        pipeline,
        tenants,
        barcode,
    };

    WebServer::new(config.web.clone(), state)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))
}
