//! Question-answering orchestration pipeline for work-order data.
//!
//! Routes each natural-language question through intent classification,
//! retrieval-augmented query synthesis with deterministic sanitization,
//! tenant-scoped read-only execution, an optional document-extraction
//! escalation, and result formatting, producing one answer envelope per
//! request.
//!
//! ## Modules
//!
//! - [`classifier`] -- direct answer vs. structured lookup routing.
//! - [`synthesizer`] -- prompt assembly, model invocation, sanitization.
//! - [`executor`] -- per-tenant read-only statement execution.
//! - [`escalation`] -- document text extraction and document-derived answers.
//! - [`formatter`] -- tabular results into the user-facing answer shape.
//! - [`orchestrator`] -- the state machine tying the stages together.
//! - [`context`] -- process-wide schema and abbreviation data.
//! - [`traits`] -- collaborator seams (LLM, search, extraction, tenants).

pub mod classifier;
pub mod context;
pub mod error;
pub mod escalation;
pub mod executor;
pub mod formatter;
pub mod orchestrator;
pub mod question;
pub mod synthesizer;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use classifier::{Intent, IntentClassifier, SQL_ONLY_SENTINEL};
pub use context::DomainContext;
pub use error::{PipelineError, Result};
pub use escalation::{BINARY_DOCUMENT_COLUMN, EscalationBranch};
pub use executor::{ExecutionError, QueryExecutor, ResultSet};
pub use formatter::{AnswerPayload, ResultFormatter};
pub use orchestrator::{AnswerEnvelope, IntentKind, Pipeline};
pub use question::{Question, TenantContext, Turn};
pub use synthesizer::{GeneratedQuery, QuerySynthesizer, sanitize_statement};
pub use traits::{
    DocumentExtractor, ExampleSearch, ExtractError, InvokeError, LanguageModel, RetrievedExample,
    SearchError, TenantResolver,
};
