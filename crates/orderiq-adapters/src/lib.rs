//! Collaborator adapters for OrderIQ.
//!
//! Thin I/O wrappers behind the pipeline's collaborator seams:
//!
//! - [`llm`] -- Azure OpenAI / OpenAI-compatible chat completions.
//! - [`search`] -- vector-similarity retrieval of stored examples.
//! - [`document`] -- poppler / tesseract document text extraction.
//! - [`token`] -- tenant token decoding.
//! - [`barcode`] -- certificate-protected barcode lookup (sibling
//!   capability, not part of the question pipeline).

pub mod barcode;
pub mod document;
pub mod error;
pub mod llm;
pub mod search;
pub mod token;

pub use barcode::{BarcodeClient, BarcodeClientConfig};
pub use document::PopplerExtractor;
pub use error::{AdapterError, Result};
pub use llm::{LlmClient, LlmClientConfig, LlmProvider};
pub use search::{SearchClientConfig, VectorSearchClient};
pub use token::{TenantClaims, TenantTokenDecoder, decode_token};
