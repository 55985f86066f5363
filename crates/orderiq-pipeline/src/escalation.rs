//! Document escalation.
//!
//! When an executed result set carries a binary-document column, the first
//! qualifying payload is written to a temporary file, text is extracted
//! (digital first, character recognition as fallback), and one model call
//! derives the answer from the extracted text.  A successful escalation
//! replaces the tabular formatter's output; any extraction failure is
//! recovered locally so the pipeline can always fall back to tabular
//! formatting.

use std::io::Write;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tracing::{debug, warn};

use crate::executor::ResultSet;
use crate::question::Question;
use crate::traits::{DocumentExtractor, InvokeError, LanguageModel};

/// Column name that marks a binary-document payload in a result set.
pub const BINARY_DOCUMENT_COLUMN: &str = "BinaryString";

/// Derives answers from documents embedded in query results.
pub struct EscalationBranch {
    llm: Arc<dyn LanguageModel>,
    extractor: Arc<dyn DocumentExtractor>,
}

impl EscalationBranch {
    pub fn new(llm: Arc<dyn LanguageModel>, extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self { llm, extractor }
    }

    /// Attempt a document-derived answer for the result set.
    ///
    /// Returns `Ok(Some(answer))` when the escalation produced an answer,
    /// `Ok(None)` when the trigger condition does not hold or no text could
    /// be extracted (the caller then formats the tabular result instead).
    /// Only a failure of the answer-synthesis model call is an error.
    pub async fn try_answer(
        &self,
        question: &Question,
        results: &ResultSet,
    ) -> Result<Option<String>, InvokeError> {
        let Some(index) = results.column_index(BINARY_DOCUMENT_COLUMN) else {
            return Ok(None);
        };
        let Some(cell) = results.rows.first().and_then(|row| row.get(index)) else {
            return Ok(None);
        };
        let Some(payload) = decode_payload(cell) else {
            return Ok(None);
        };

        let Some(text) = self.extract(&payload).await else {
            debug!("document yielded no text, falling back to tabular formatting");
            return Ok(None);
        };

        let prompt = build_document_prompt(&question.full_text(), &text);
        let answer = self.llm.invoke(&prompt).await?;
        Ok(Some(answer.trim().to_owned()))
    }

    /// Write the payload to a uniquely named temp file and extract text,
    /// digital first, recognition fallback when digital text is whitespace
    /// only.  The file is removed when this returns.
    async fn extract(&self, payload: &[u8]) -> Option<String> {
        let mut file = match tempfile::Builder::new()
            .prefix("orderiq-doc-")
            .suffix(".pdf")
            .tempfile()
        {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "could not create temp file for document payload");
                return None;
            }
        };
        if let Err(e) = file.write_all(payload).and_then(|()| file.flush()) {
            warn!(error = %e, "could not persist document payload");
            return None;
        }

        let digital = match self.extractor.extract_text(file.path()).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "digital text extraction failed");
                String::new()
            }
        };
        if !digital.trim().is_empty() {
            return Some(digital);
        }

        debug!("no digital text found, attempting character recognition");
        match self.extractor.ocr_text(file.path()).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "character recognition failed");
                None
            }
        }
    }
}

/// Decode the payload cell: base64 text when it decodes, raw bytes of the
/// string otherwise.  Null or empty cells mean no escalation.
fn decode_payload(cell: &Value) -> Option<Vec<u8>> {
    match cell {
        Value::String(s) if !s.is_empty() => {
            Some(BASE64.decode(s).unwrap_or_else(|_| s.clone().into_bytes()))
        }
        _ => None,
    }
}

/// Prompt for answering the user's question from extracted document text.
fn build_document_prompt(question_text: &str, extracted_text: &str) -> String {
    format!(
        "You are an expert assistant. The following is the extracted text from a document:\n\
         \n\
         ---\n\
         {extracted_text}\n\
         ---\n\
         \n\
         The user has the following question about this document:\n\
         \"{question_text}\"\n\
         \n\
         Rules:\n\
         1. First understand the user's question.\n\
         2. If the user question is general, answer directly from your knowledge, not from the \
         extracted text (for example \"what is the chemical composition as per API 5L\").\n\
         3. If the user question requires any comparison or analysis, use the extracted text \
         together with your knowledge to provide a detailed answer. For example, for \"are the \
         chemical properties for this heat number consistent with API 5L requirements?\", take \
         the values from the extracted text, take the API 5L requirements from your knowledge, \
         compare them, and provide the analysis in your response.\n"
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::traits::ExtractError;

    /// Extractor fake that scripts both extraction primitives and records
    /// the payload bytes it was handed.
    struct FakeExtractor {
        digital: Result<&'static str, &'static str>,
        ocr: Result<&'static str, &'static str>,
        seen_payloads: Mutex<Vec<Vec<u8>>>,
        ocr_calls: Mutex<usize>,
    }

    impl FakeExtractor {
        fn new(
            digital: Result<&'static str, &'static str>,
            ocr: Result<&'static str, &'static str>,
        ) -> Self {
            Self {
                digital,
                ocr,
                seen_payloads: Mutex::new(Vec::new()),
                ocr_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentExtractor for FakeExtractor {
        async fn extract_text(&self, document: &Path) -> Result<String, ExtractError> {
            let bytes = std::fs::read(document).unwrap();
            self.seen_payloads.lock().unwrap().push(bytes);
            self.digital
                .map(str::to_owned)
                .map_err(ExtractError::new)
        }

        async fn ocr_text(&self, _document: &Path) -> Result<String, ExtractError> {
            *self.ocr_calls.lock().unwrap() += 1;
            self.ocr.map(str::to_owned).map_err(ExtractError::new)
        }
    }

    struct FixedModel(&'static str);

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn invoke(&self, _prompt: &str) -> Result<String, InvokeError> {
            Ok(self.0.to_owned())
        }
    }

    fn results_with(columns: Vec<&str>, rows: Vec<Vec<Value>>) -> ResultSet {
        ResultSet {
            columns: columns.into_iter().map(String::from).collect(),
            rows,
        }
    }

    fn question() -> Question {
        Question::new("what are the mechanical properties for heat 723260y5?")
    }

    #[tokio::test]
    async fn no_binary_column_means_no_escalation() {
        let extractor = Arc::new(FakeExtractor::new(Ok("text"), Ok("")));
        let branch = EscalationBranch::new(Arc::new(FixedModel("answer")), extractor.clone());

        let results = results_with(vec!["JointID"], vec![vec![Value::String("W-1".into())]]);
        let answer = branch.try_answer(&question(), &results).await.unwrap();

        assert!(answer.is_none());
        assert!(extractor.seen_payloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_result_set_means_no_escalation() {
        let extractor = Arc::new(FakeExtractor::new(Ok("text"), Ok("")));
        let branch = EscalationBranch::new(Arc::new(FixedModel("answer")), extractor);

        let results = results_with(vec![BINARY_DOCUMENT_COLUMN], vec![]);
        assert!(
            branch
                .try_answer(&question(), &results)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn null_payload_means_no_escalation() {
        let extractor = Arc::new(FakeExtractor::new(Ok("text"), Ok("")));
        let branch = EscalationBranch::new(Arc::new(FixedModel("answer")), extractor);

        let results = results_with(vec![BINARY_DOCUMENT_COLUMN], vec![vec![Value::Null]]);
        assert!(
            branch
                .try_answer(&question(), &results)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn base64_payload_is_decoded_before_extraction() {
        let extractor = Arc::new(FakeExtractor::new(Ok("Yield strength 52000 psi"), Ok("")));
        let branch = EscalationBranch::new(
            Arc::new(FixedModel("The yield strength is 52,000 psi.")),
            extractor.clone(),
        );

        let payload = BASE64.encode(b"%PDF-1.4 fake");
        let results = results_with(
            vec![BINARY_DOCUMENT_COLUMN],
            vec![vec![Value::String(payload)]],
        );

        let answer = branch.try_answer(&question(), &results).await.unwrap();
        assert_eq!(answer.as_deref(), Some("The yield strength is 52,000 psi."));
        assert_eq!(
            extractor.seen_payloads.lock().unwrap()[0],
            b"%PDF-1.4 fake".to_vec()
        );
    }

    #[tokio::test]
    async fn whitespace_digital_text_falls_back_to_recognition() {
        let extractor = Arc::new(FakeExtractor::new(Ok("  \n \t"), Ok("C 0.23 Mn 1.05")));
        let branch = EscalationBranch::new(
            Arc::new(FixedModel("Carbon is 0.23%.")),
            extractor.clone(),
        );

        let results = results_with(
            vec![BINARY_DOCUMENT_COLUMN],
            vec![vec![Value::String(BASE64.encode(b"doc"))]],
        );

        let answer = branch.try_answer(&question(), &results).await.unwrap();
        assert_eq!(answer.as_deref(), Some("Carbon is 0.23%."));
        assert_eq!(*extractor.ocr_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn extraction_failures_are_recovered_as_no_answer() {
        let extractor = Arc::new(FakeExtractor::new(Err("corrupt file"), Err("no rasterizer")));
        let branch = EscalationBranch::new(Arc::new(FixedModel("unused")), extractor);

        let results = results_with(
            vec![BINARY_DOCUMENT_COLUMN],
            vec![vec![Value::String(BASE64.encode(b"doc"))]],
        );

        assert!(
            branch
                .try_answer(&question(), &results)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn no_text_from_either_path_means_no_answer() {
        let extractor = Arc::new(FakeExtractor::new(Ok(""), Ok("  ")));
        let branch = EscalationBranch::new(Arc::new(FixedModel("unused")), extractor);

        let results = results_with(
            vec![BINARY_DOCUMENT_COLUMN],
            vec![vec![Value::String(BASE64.encode(b"doc"))]],
        );

        assert!(
            branch
                .try_answer(&question(), &results)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn prompt_embeds_text_and_question() {
        let prompt = build_document_prompt("is this consistent with API 5L?", "C 0.23 Mn 1.05");
        assert!(prompt.contains("C 0.23 Mn 1.05"));
        assert!(prompt.contains("is this consistent with API 5L?"));
        assert!(prompt.contains("comparison or analysis"));
    }
}
