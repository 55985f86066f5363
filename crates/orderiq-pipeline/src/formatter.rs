//! Tabular result formatting.
//!
//! One model call turns an executed result set into the user-facing answer:
//! a single-key `{"answer": …}` structure for single-row and zero-row
//! results, an array of column-keyed objects for multi-row results.  The
//! full column and row lists are embedded in the prompt, never truncated or
//! sampled.  A response that does not parse as the requested structure is
//! returned verbatim as plain text.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::executor::ResultSet;
use crate::question::Question;
use crate::synthesizer::GeneratedQuery;
use crate::traits::{InvokeError, LanguageModel};

/// The terminal answer value: either a structured JSON value in the shape
/// requested from the model, or the model's raw text when parsing failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnswerPayload {
    Text(String),
    Structured(Value),
}

/// Formats executed result sets with a single model call.
pub struct ResultFormatter {
    llm: Arc<dyn LanguageModel>,
}

impl ResultFormatter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn format(
        &self,
        results: &ResultSet,
        question: &Question,
        query: &GeneratedQuery,
    ) -> Result<AnswerPayload, InvokeError> {
        let prompt = build_format_prompt(results, &question.full_text(), &query.statement);
        let response = self.llm.invoke(&prompt).await?;

        let payload = parse_payload(&response);
        debug!(
            rows = results.rows.len(),
            structured = matches!(payload, AnswerPayload::Structured(_)),
            "formatted result set"
        );
        Ok(payload)
    }
}

/// Build the formatting prompt with the full column and row lists.
fn build_format_prompt(results: &ResultSet, question_text: &str, statement: &str) -> String {
    let columns = serde_json::to_string(&results.columns).unwrap_or_default();
    let rows = serde_json::to_string(&results.rows).unwrap_or_default();

    format!(
        "You are an assistant. The user asked: \"{question_text}\"\n\
         The SQL generated was: {statement}\n\
         The raw results are below.\n\
         \n\
         Columns: {columns}\n\
         Rows: {rows}\n\
         \n\
         Return the results as JSON:\n\
         - Never truncate, omit, or summarize the results. Always show all rows returned after \
         executing the SQL query, even if there are more than 100 rows.\n\
         - If there is only one row, DO NOT return the raw column/value mapping. Instead, \
         generate a clear, user-friendly answer as a string and return it in the following \
         format: {{\"answer\": \"<your answer here>\"}}. Do not use the column name as the key.\n\
         - If there are multiple rows, return a JSON array of objects, each with column names as keys.\n\
         - If there are no results, explain clearly as an answer to that user question, using \
         the same {{\"answer\": \"...\"}} format.\n\
         - Do not add any commentary or extra text in the JSON response.\n\
         - If the results are a single row, use clear formatting such as bullet points, lists, \
         or short paragraphs to make the answer easy to read.\n\
         \n\
         Example (multiple rows):\n\
         [\n\
           {{\"TaskNum\": \"CE23/24-Hyb\", \"TaskDesc\": \"Inspecting the Condition of Exposed Pipe\"}},\n\
           {{\"TaskNum\": \"CE31B-Hyb\", \"TaskDesc\": \"Installation of Pipe - Installing Pipe in a Ditch\"}}\n\
         ]\n\
         \n\
         Example (single row):\n\
         {{\"answer\": \"There are 134 welds in work order 100139423P2.\"}}\n\
         \n\
         Return only the JSON, nothing else.\n"
    )
}

/// Parse the model response as the requested structure (object or array),
/// tolerating a surrounding code fence; anything else is returned verbatim.
fn parse_payload(response: &str) -> AnswerPayload {
    let trimmed = response.trim();
    let candidate = strip_code_fence(trimmed);

    match serde_json::from_str::<Value>(candidate) {
        Ok(v) if v.is_object() || v.is_array() => AnswerPayload::Structured(v),
        _ => AnswerPayload::Text(trimmed.to_owned()),
    }
}

/// Strip one surrounding markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}
