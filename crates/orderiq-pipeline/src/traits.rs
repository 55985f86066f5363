//! Collaborator seams.
//!
//! The pipeline consumes four external capabilities through these traits:
//! language-model inference, vector-similarity example retrieval, document
//! text extraction, and tenant token resolution.  Concrete implementations
//! live in the adapters crate; tests substitute scripted fakes.

use std::path::Path;

use async_trait::async_trait;

use crate::question::TenantContext;

// ---------------------------------------------------------------------------
// Seam errors
// ---------------------------------------------------------------------------

/// A language-model invocation failed.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct InvokeError {
    pub reason: String,
}

impl InvokeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An example-retrieval call failed.  An empty result list is not a
/// failure; this is reserved for transport and contract errors.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct SearchError {
    pub reason: String,
}

impl SearchError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A document text-extraction step failed.  Always recovered locally by
/// the escalation branch.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct ExtractError {
    pub reason: String,
}

impl ExtractError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Synchronous, single-turn language-model inference.  No conversation
/// state is retained across calls.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one prompt and return the model's text response.
    async fn invoke(&self, prompt: &str) -> Result<String, InvokeError>;
}

/// A stored example returned by the vector-similarity search service.
#[derive(Debug, Clone)]
pub struct RetrievedExample {
    /// The retrievable text content of the document.
    pub content: String,
}

/// Vector-similarity retrieval over stored question/query examples.
#[async_trait]
pub trait ExampleSearch: Send + Sync {
    /// Return up to `k` documents nearest to `text`, best match first.
    async fn search(&self, text: &str, k: usize) -> Result<Vec<RetrievedExample>, SearchError>;
}

/// Document text extraction with an OCR fallback path.
///
/// The escalation branch drives the fallback sequencing; implementations
/// only provide the two extraction primitives.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract embedded digital text, concatenated page by page.
    async fn extract_text(&self, document: &Path) -> Result<String, ExtractError>;

    /// Rasterize pages and run character recognition, concatenating
    /// recognized text in page order.
    async fn ocr_text(&self, document: &Path) -> Result<String, ExtractError>;
}

/// Derives the tenant context from an opaque request token.
///
/// Any decode failure yields `None`; a missing or bad token is never a
/// request-level error.
pub trait TenantResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<TenantContext>;
}
