//! The immutable request input and the per-request tenant context.

use serde::{Deserialize, Serialize};

/// How many prior conversation turns are retained per question.
const HISTORY_LIMIT: usize = 3;

/// A single prior conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the turn (`"user"` or `"assistant"`).
    pub role: String,
    /// The textual content of the turn.
    pub content: String,
}

impl Turn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// An immutable user question.
///
/// Carries the free-text question, up to the [`HISTORY_LIMIT`] most recent
/// prior turns, and an optional opaque tenant token.  Created once at the
/// transport boundary and handed by reference through the pipeline.
#[derive(Debug, Clone)]
pub struct Question {
    text: String,
    history: Vec<Turn>,
    token: Option<String>,
}

impl Question {
    /// Create a question with no history and no tenant token.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            history: Vec::new(),
            token: None,
        }
    }

    /// Attach prior conversation turns.  Only the most recent
    /// [`HISTORY_LIMIT`] turns are retained.
    pub fn with_history(mut self, turns: Vec<Turn>) -> Self {
        let skip = turns.len().saturating_sub(HISTORY_LIMIT);
        self.history = turns.into_iter().skip(skip).collect();
        self
    }

    /// Attach an opaque tenant token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The raw question text, without history.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The opaque tenant token, if one was supplied.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Render the question with its retained history flattened in front,
    /// one `Previous message N (role): content` line per turn followed by
    /// the current question.  With no history this is just the raw text.
    pub fn full_text(&self) -> String {
        if self.history.is_empty() {
            return self.text.clone();
        }

        let mut out = String::new();
        for (i, turn) in self.history.iter().enumerate() {
            out.push_str(&format!(
                "Previous message {} ({}): {}\n",
                i + 1,
                turn.role,
                turn.content
            ));
        }
        out.push_str(&format!("Current question: {}", self.text));
        out
    }
}

/// The per-request identification of which database a query must run
/// against.  Derived once from token decryption; absent when no token was
/// supplied or the token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    /// The tenant's database name.
    pub database_name: String,
}

impl TenantContext {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
        }
    }
}
