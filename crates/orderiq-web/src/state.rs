//! Shared application state.

use std::sync::Arc;

use orderiq_adapters::BarcodeClient;
use orderiq_pipeline::{Pipeline, TenantResolver};

/// State shared across all request handlers.
pub struct AppState {
    /// The question-answering pipeline.
    pub pipeline: Pipeline,
    /// Tenant resolution, used by the transport to label executed queries
    /// with their database.
    pub tenants: Arc<dyn TenantResolver>,
    /// Barcode lookup, when configured.
    pub barcode: Option<BarcodeClient>,
}
