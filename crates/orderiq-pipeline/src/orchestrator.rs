//! End-to-end pipeline orchestration.
//!
//! Sequences classification, synthesis, execution, escalation, and
//! formatting as an explicit state machine:
//!
//! ```text
//! Start → Classified → DirectAnswered ───────────────────────────→ Done
//!                    → Synthesized ─ (no tenant) ────────────────→ Done
//!                                  → Executed → Escalated ───────→ Done
//!                                             → Formatted ───────→ Done
//! ```
//!
//! Each state owns the data produced so far and hands it to the next
//! transition by value, so a request can never yield both the escalated
//! and the formatted answer.  Every terminal transition produces exactly
//! one [`AnswerEnvelope`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{Intent, IntentClassifier};
use crate::context::DomainContext;
use crate::error::Result;
use crate::escalation::EscalationBranch;
use crate::executor::{QueryExecutor, ResultSet};
use crate::formatter::{AnswerPayload, ResultFormatter};
use crate::question::Question;
use crate::synthesizer::{GeneratedQuery, QuerySynthesizer};
use crate::traits::{DocumentExtractor, ExampleSearch, LanguageModel, TenantResolver};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The routing tag carried in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IntentKind {
    /// The question was answered directly, without a query.
    #[serde(rename = "general")]
    General,
    /// The question was routed to the structured-data lookup path.
    #[serde(rename = "SQL-Only")]
    StructuredLookup,
}

/// The terminal artifact of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerEnvelope {
    pub intent: IntentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<AnswerPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnswerEnvelope {
    /// Direct answer, no query involved.
    fn direct(answer: String) -> Self {
        Self {
            intent: IntentKind::General,
            answer: Some(AnswerPayload::Text(answer)),
            sql: None,
            error: None,
        }
    }

    /// Query generated but not executed (no tenant context available).
    fn unexecuted(query: GeneratedQuery) -> Self {
        Self {
            intent: IntentKind::StructuredLookup,
            answer: None,
            sql: Some(query.statement),
            error: None,
        }
    }

    /// Query executed and answered, either by escalation or formatting.
    fn resolved(query: GeneratedQuery, answer: AnswerPayload) -> Self {
        Self {
            intent: IntentKind::StructuredLookup,
            answer: Some(answer),
            sql: Some(query.statement),
            error: None,
        }
    }

    /// Execution or answer derivation failed; the attempted query is kept.
    fn failed(query: GeneratedQuery, error: String) -> Self {
        Self {
            intent: IntentKind::StructuredLookup,
            answer: None,
            sql: Some(query.statement),
            error: Some(error),
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Named pipeline states.  Each state owns everything produced so far.
enum Stage {
    Start,
    Classified(Intent),
    Synthesized(GeneratedQuery),
    Executed(GeneratedQuery, ResultSet),
    Done(AnswerEnvelope),
}

/// The question-answering pipeline.
///
/// One instance serves many concurrent requests; the only shared state is
/// the immutable domain context, so requests execute fully independently.
pub struct Pipeline {
    classifier: IntentClassifier,
    synthesizer: QuerySynthesizer,
    executor: QueryExecutor,
    escalation: EscalationBranch,
    formatter: ResultFormatter,
    tenants: Arc<dyn TenantResolver>,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn ExampleSearch>,
        extractor: Arc<dyn DocumentExtractor>,
        tenants: Arc<dyn TenantResolver>,
        context: Arc<DomainContext>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(llm.clone()),
            synthesizer: QuerySynthesizer::new(llm.clone(), search, context),
            executor: QueryExecutor::new(data_dir),
            escalation: EscalationBranch::new(llm.clone(), extractor),
            formatter: ResultFormatter::new(llm),
            tenants,
        }
    }

    /// Run one question through the pipeline.
    ///
    /// Classification and synthesis failures propagate; everything after
    /// synthesis resolves into the envelope (error field included).
    pub async fn answer(&self, question: &Question) -> Result<AnswerEnvelope> {
        // Tenant context is derived exactly once per request.  A missing or
        // undecodable token skips the execution stage, it is not an error.
        let tenant = question.token().and_then(|t| self.tenants.resolve(t));
        info!(
            question = question.text(),
            has_tenant = tenant.is_some(),
            "handling question"
        );

        let mut stage = Stage::Start;
        loop {
            stage = match stage {
                Stage::Start => Stage::Classified(self.classifier.classify(question).await?),

                Stage::Classified(Intent::DirectAnswer(text)) => {
                    Stage::Done(AnswerEnvelope::direct(text))
                }

                Stage::Classified(Intent::StructuredLookup) => {
                    // A query is synthesized even without a tenant context.
                    Stage::Synthesized(self.synthesizer.synthesize(question).await?)
                }

                Stage::Synthesized(query) => match &tenant {
                    None => Stage::Done(AnswerEnvelope::unexecuted(query)),
                    Some(tenant) => match self.executor.execute(&query, tenant).await {
                        Ok(results) => Stage::Executed(query, results),
                        // Never retried; the envelope keeps the attempted query.
                        Err(e) => {
                            warn!(error = %e, "query execution failed");
                            Stage::Done(AnswerEnvelope::failed(query, e.message))
                        }
                    },
                },

                Stage::Executed(query, results) => {
                    match self.escalation.try_answer(question, &results).await {
                        // The document-derived answer replaces tabular formatting.
                        Ok(Some(answer)) => Stage::Done(AnswerEnvelope::resolved(
                            query,
                            AnswerPayload::Text(answer),
                        )),
                        Ok(None) => {
                            match self.formatter.format(&results, question, &query).await {
                                Ok(answer) => {
                                    Stage::Done(AnswerEnvelope::resolved(query, answer))
                                }
                                Err(e) => {
                                    warn!(error = %e, "result formatting failed");
                                    Stage::Done(AnswerEnvelope::failed(query, e.to_string()))
                                }
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "document answer synthesis failed");
                            Stage::Done(AnswerEnvelope::failed(query, e.to_string()))
                        }
                    }
                }

                Stage::Done(envelope) => {
                    debug!(intent = ?envelope.intent, has_error = envelope.error.is_some(), "pipeline done");
                    return Ok(envelope);
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn query(statement: &str) -> GeneratedQuery {
        GeneratedQuery {
            statement: statement.into(),
            question: "q".into(),
            examples: None,
        }
    }

    #[test]
    fn direct_envelopes_carry_no_query() {
        let envelope = AnswerEnvelope::direct("Hello!".into());
        assert_eq!(envelope.intent, IntentKind::General);
        assert!(envelope.sql.is_none());
        assert!(envelope.error.is_none());
    }

    #[test]
    fn failed_envelopes_keep_the_attempted_query() {
        let envelope = AnswerEnvelope::failed(query("SELECT 1;"), "no such table".into());
        assert_eq!(envelope.sql.as_deref(), Some("SELECT 1;"));
        assert!(envelope.answer.is_none());
        assert_eq!(envelope.error.as_deref(), Some("no such table"));
    }

    #[test]
    fn envelope_serialization_omits_absent_fields() {
        let envelope = AnswerEnvelope::unexecuted(query("SELECT 1;"));
        let v = serde_json::to_value(&envelope).unwrap();
        assert_eq!(v, json!({"intent": "SQL-Only", "sql": "SELECT 1;"}));

        let envelope = AnswerEnvelope::direct("Hi!".into());
        let v = serde_json::to_value(&envelope).unwrap();
        assert_eq!(v, json!({"intent": "general", "answer": "Hi!"}));
    }
}
