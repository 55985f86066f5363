//! Pipeline error types.
//!
//! Only two failure kinds are fatal for a request: a failed intent
//! classification and a failed query synthesis.  Everything downstream of
//! synthesis either falls back to an alternate path (document escalation →
//! tabular formatting) or is absorbed into the answer envelope as an error
//! field, so those stages carry their own local error types instead of
//! appearing here.

/// Unrecoverable request-level failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The intent-classification model call failed.
    #[error("intent classification failed: {reason}")]
    Classification { reason: String },

    /// The query-synthesis model call (or the example retrieval feeding it)
    /// failed.
    #[error("query synthesis failed: {reason}")]
    Synthesis { reason: String },
}

/// Convenience alias used throughout the pipeline crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
