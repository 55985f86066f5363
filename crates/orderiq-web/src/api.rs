//! REST API route handlers.
//!
//! `POST /ask` runs a question through the pipeline and shapes the answer
//! envelope into the transport response; `POST /barcode` proxies the
//! sibling barcode lookup.  The `answer` field of the response is always a
//! string: structured payloads are serialized and nested `{"answer": …}`
//! values are unwrapped first.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::error;

use orderiq_pipeline::{AnswerEnvelope, AnswerPayload, Question, Turn};

use crate::state::AppState;

/// Header carrying the opaque tenant token.
pub const TENANT_TOKEN_HEADER: &str = "encoded-string";

/// Header carrying the barcode API auth token.
pub const BARCODE_TOKEN_HEADER: &str = "token";

// ---------------------------------------------------------------------------
// POST /ask
// ---------------------------------------------------------------------------

/// A prior conversation message.
#[derive(Debug, Deserialize)]
pub struct PrevMessage {
    pub role: String,
    pub content: String,
}

/// Request payload for `/ask`.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub prev_msgs: Vec<PrevMessage>,
    #[serde(default)]
    pub token: Option<String>,
}

/// One conversation turn echoed back in the response context.
#[derive(Debug, Serialize)]
pub struct ContextEntry {
    pub role: &'static str,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct UserDetails {
    pub session_id: Option<String>,
    pub token: Option<String>,
}

/// An executed query and the database it ran against.
#[derive(Debug, Serialize)]
pub struct SqlQueryEntry {
    pub db: String,
    pub query: String,
}

/// Response payload for `/ask`.
#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub timestamp: String,
    pub context: Vec<ContextEntry>,
    pub user_details: UserDetails,
    pub sql_queries: Vec<SqlQueryEntry>,
}

/// Run one question through the pipeline.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<Value>)> {
    let tenant_token = header_value(&headers, TENANT_TOKEN_HEADER);

    let turns = body
        .prev_msgs
        .iter()
        .map(|m| Turn::new(&m.role, &m.content))
        .collect();
    let mut question = Question::new(&body.query).with_history(turns);
    if let Some(token) = &tenant_token {
        question = question.with_token(token);
    }

    let envelope = state.pipeline.answer(&question).await.map_err(|e| {
        error!(error = %e, "pipeline failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;

    let timestamp = Utc::now().to_rfc3339();
    let answer = response_text(&envelope);

    let context = vec![
        ContextEntry {
            role: "user",
            content: body.query.clone(),
            timestamp: timestamp.clone(),
        },
        ContextEntry {
            role: "assistant",
            content: answer.clone(),
            timestamp: timestamp.clone(),
        },
    ];

    // Label the executed query with its tenant database, when known.
    let database_name = tenant_token
        .as_deref()
        .and_then(|t| state.tenants.resolve(t))
        .map(|t| t.database_name)
        .unwrap_or_default();
    let sql_queries = envelope
        .sql
        .iter()
        .map(|query| SqlQueryEntry {
            db: database_name.clone(),
            query: query.clone(),
        })
        .collect();

    Ok(Json(AskResponse {
        answer,
        timestamp,
        context,
        user_details: UserDetails {
            session_id: None,
            token: body.token,
        },
        sql_queries,
    }))
}

// ---------------------------------------------------------------------------
// POST /barcode
// ---------------------------------------------------------------------------

/// Request payload for `/barcode`.
#[derive(Debug, Deserialize)]
pub struct BarcodeRequest {
    pub barcode: String,
}

/// Look up a barcode against the asset API.
pub async fn barcode_lookup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BarcodeRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Some(client) = &state.barcode else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "barcode lookup is not configured" })),
        ));
    };

    let token = header_value(&headers, BARCODE_TOKEN_HEADER).unwrap_or_default();
    match client.lookup(&body.barcode, &token).await {
        Ok(result) => Ok(Json(result)),
        // Lookup failures are reported in-band, not as transport errors.
        Err(e) => Ok(Json(json!({ "error": e.to_string() }))),
    }
}

// ---------------------------------------------------------------------------
// Response shaping
// ---------------------------------------------------------------------------

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Flatten the envelope into the response text: the answer when present,
/// then the error, then the bare generated query.
fn response_text(envelope: &AnswerEnvelope) -> String {
    if let Some(answer) = &envelope.answer {
        return payload_text(answer);
    }
    if let Some(error) = &envelope.error {
        return error.clone();
    }
    if let Some(sql) = &envelope.sql {
        return sql.clone();
    }
    serde_json::to_string(envelope).unwrap_or_default()
}

/// Render an answer payload as a string, unwrapping nested
/// `{"answer": …}` structures first.
fn payload_text(payload: &AnswerPayload) -> String {
    match payload {
        AnswerPayload::Text(text) => text.clone(),
        AnswerPayload::Structured(value) => {
            let mut value = value;
            while let Some(inner) = value.as_object().and_then(|o| o.get("answer")) {
                value = inner;
            }
            match value {
                Value::String(s) => s.clone(),
                other => serde_json::to_string(other).unwrap_or_default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use orderiq_pipeline::IntentKind;

    use super::*;

    fn envelope(
        answer: Option<AnswerPayload>,
        sql: Option<&str>,
        error: Option<&str>,
    ) -> AnswerEnvelope {
        AnswerEnvelope {
            intent: IntentKind::StructuredLookup,
            answer,
            sql: sql.map(str::to_owned),
            error: error.map(str::to_owned),
        }
    }

    #[test]
    fn single_key_answers_unwrap_to_their_text() {
        let payload = AnswerPayload::Structured(json!({"answer": "There are 134 welds."}));
        assert_eq!(payload_text(&payload), "There are 134 welds.");
    }

    #[test]
    fn nested_answers_unwrap_recursively() {
        let payload = AnswerPayload::Structured(json!({"answer": {"answer": "deep"}}));
        assert_eq!(payload_text(&payload), "deep");
    }

    #[test]
    fn row_arrays_serialize_to_json_text() {
        let payload = AnswerPayload::Structured(json!([{"WeldNumber": "W-1"}]));
        assert_eq!(payload_text(&payload), r#"[{"WeldNumber":"W-1"}]"#);
    }

    #[test]
    fn response_text_prefers_answer_then_error_then_sql() {
        let e = envelope(
            Some(AnswerPayload::Text("the answer".into())),
            Some("SELECT 1;"),
            Some("boom"),
        );
        assert_eq!(response_text(&e), "the answer");

        let e = envelope(None, Some("SELECT 1;"), Some("boom"));
        assert_eq!(response_text(&e), "boom");

        let e = envelope(None, Some("SELECT 1;"), None);
        assert_eq!(response_text(&e), "SELECT 1;");
    }

    #[test]
    fn ask_request_tolerates_missing_optionals() {
        let body: AskRequest = serde_json::from_str(r#"{"query": "hello"}"#).unwrap();
        assert_eq!(body.query, "hello");
        assert!(body.prev_msgs.is_empty());
        assert!(body.token.is_none());

        let body: AskRequest = serde_json::from_str(
            r#"{"query": "q", "prev_msgs": [{"role": "user", "content": "hi"}], "token": "t"}"#,
        )
        .unwrap();
        assert_eq!(body.prev_msgs.len(), 1);
        assert_eq!(body.token.as_deref(), Some("t"));
    }
}
