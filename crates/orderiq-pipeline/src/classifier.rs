//! Intent classification.
//!
//! Uses the LLM to decide whether a question can be answered directly
//! (general engineering, greetings, weather) or must be routed to the
//! structured-data lookup path.  The model signals the lookup path by
//! returning the bare sentinel `SQL-Only`; anything else is taken verbatim
//! as the direct answer.

use std::sync::Arc;

use chrono::Local;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::question::Question;
use crate::traits::LanguageModel;

/// The literal the model must return, alone, to route a question to the
/// structured-data lookup path.
pub const SQL_ONLY_SENTINEL: &str = "SQL-Only";

/// The routing decision for a question.  Produced once, consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// The model answered the question itself; the payload is the answer.
    DirectAnswer(String),
    /// The question references stored records and needs a generated query.
    StructuredLookup,
}

/// Classifies questions with a single LLM call.
pub struct IntentClassifier {
    llm: Arc<dyn LanguageModel>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Classify a question.
    ///
    /// A model-invocation failure is fatal for the request and propagates
    /// uncaught; the capability is assumed to carry its own transport
    /// resilience, so there is no retry here.
    pub async fn classify(&self, question: &Question) -> Result<Intent> {
        let prompt = build_prompt(&question.full_text());

        let response =
            self.llm
                .invoke(&prompt)
                .await
                .map_err(|e| PipelineError::Classification {
                    reason: e.to_string(),
                })?;

        let intent = parse_response(&response);
        debug!(question = question.text(), ?intent, "classified question");
        Ok(intent)
    }
}

/// Build the classification prompt, embedding today's date and year.
fn build_prompt(question_text: &str) -> String {
    let now = Local::now();
    let current_date = now.format("%B %d, %Y");
    let current_year = now.format("%Y");

    format!(
        "You are an expert assistant for work order and pipeline engineering questions.\n\
         Today's date is {current_date} and the current year is {current_year}.\n\
         \n\
         Instructions:\n\
         - If the user's question is a general question (greetings, what's the date, general \
         engineering, design calculations, standards, formulas, or topics about pipe properties, \
         MAOP, wall thickness, steel grade, ASME codes, etc.), answer it directly and concisely.\n\
         - If the user's question is about the weather, and you cannot access real-time weather \
         data, provide a typical or seasonal weather summary for the location and time of year, \
         and mention that you cannot access real-time updates.\n\
         - If the question is specifically about database records (such as work order numbers, \
         weld records, asset IDs, chemical/mechanical properties, or requests to look up, list, \
         or retrieve information from the database), do NOT answer, just return: {SQL_ONLY_SENTINEL}\n\
         \n\
         User Question:\n\
         {question_text}\n\
         \n\
         Answer or Routing intent:\n"
    )
}

/// Interpret the model's trimmed response: the exact sentinel routes to the
/// lookup path, anything else is the direct answer.
fn parse_response(response: &str) -> Intent {
    let trimmed = response.trim();
    if trimmed == SQL_ONLY_SENTINEL {
        Intent::StructuredLookup
    } else {
        Intent::DirectAnswer(trimmed.to_owned())
    }
}
