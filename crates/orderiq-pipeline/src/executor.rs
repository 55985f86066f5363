//! Tenant-scoped query execution.
//!
//! Each call opens one short-lived SQLite connection for the tenant's
//! database, runs the sanitized statement, materializes all columns and
//! rows, and closes the connection on every exit path.  Connections are
//! opened read-only and never create a missing database file, so a bad
//! tenant name surfaces as an execution error and the read-only guarantee
//! holds at the storage layer as well as in the sanitizer.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, Connection, Executor, Row, SqliteConnection, Statement};
use tracing::{debug, warn};

use crate::question::TenantContext;
use crate::synthesizer::GeneratedQuery;

/// A connectivity or statement failure.  Caught at the orchestrator and
/// returned in the answer envelope alongside the attempted query.
#[derive(Debug, thiserror::Error)]
#[error("query execution failed: {message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Ordered column names plus ordered rows, each row aligned to the
/// columns.  An empty row sequence is a valid result, distinct from an
/// execution error.  BLOB cells are carried as base64 strings.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Position of a column by exact name, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes sanitized statements against per-tenant database files.
pub struct QueryExecutor {
    data_dir: PathBuf,
}

impl QueryExecutor {
    /// `data_dir` is the directory holding one `<database_name>.db` file
    /// per tenant.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Execute the statement against the tenant's database.
    ///
    /// Does not re-validate sanitization: a non-empty statement with no
    /// read keyword is attempted anyway and the database-level error is
    /// surfaced.  No retry on failure.
    pub async fn execute(
        &self,
        query: &GeneratedQuery,
        tenant: &TenantContext,
    ) -> Result<ResultSet, ExecutionError> {
        // Sanitization may legitimately produce an empty statement (e.g. the
        // model answered a greeting instead of generating a query).
        if query.statement.trim().is_empty() {
            return Err(ExecutionError::new("no executable statement was generated"));
        }

        let path = self.database_path(&tenant.database_name)?;
        debug!(
            database = %tenant.database_name,
            statement = %query.statement,
            "executing query"
        );

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(false)
            .read_only(true);

        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| {
                ExecutionError::new(format!(
                    "cannot open database `{}`: {e}",
                    tenant.database_name
                ))
            })?;

        let outcome = run_statement(&mut conn, &query.statement).await;

        // Release the connection on every path, including statement errors.
        if let Err(e) = conn.close().await {
            warn!(error = %e, database = %tenant.database_name, "connection close failed");
        }

        outcome
    }

    /// Map a tenant database name onto its file path.  Tenant names are
    /// plain identifiers; anything resembling a path component is refused.
    fn database_path(&self, database_name: &str) -> Result<PathBuf, ExecutionError> {
        let valid = !database_name.is_empty()
            && database_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ExecutionError::new(format!(
                "invalid database name `{database_name}`"
            )));
        }
        Ok(self.data_dir.join(format!("{database_name}.db")))
    }
}

/// Prepare the statement (yielding column metadata even for zero-row
/// results), fetch all rows, and decode cells into JSON values.
async fn run_statement(
    conn: &mut SqliteConnection,
    statement: &str,
) -> Result<ResultSet, ExecutionError> {
    let prepared = conn
        .prepare(statement)
        .await
        .map_err(|e| ExecutionError::new(e.to_string()))?;

    let columns: Vec<String> = prepared
        .columns()
        .iter()
        .map(|c| c.name().to_owned())
        .collect();

    let fetched = prepared
        .query()
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| ExecutionError::new(e.to_string()))?;

    let rows = fetched
        .iter()
        .map(|row| (0..columns.len()).map(|i| decode_cell(row, i)).collect())
        .collect();

    Ok(ResultSet { columns, rows })
}

/// Decode one cell into a JSON value: integer, real, text, blob (as
/// base64), or null.
fn decode_cell(row: &SqliteRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<i64, _>(index) {
        Value::Number(v.into())
    } else if let Ok(v) = row.try_get::<f64, _>(index) {
        serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if let Ok(v) = row.try_get::<String, _>(index) {
        Value::String(v)
    } else if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        Value::String(BASE64.encode(v))
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn query(statement: &str) -> GeneratedQuery {
        GeneratedQuery {
            statement: statement.to_owned(),
            question: "test".into(),
            examples: None,
        }
    }

    async fn seed_database(dir: &Path, name: &str, statements: &[&str]) {
        let options = SqliteConnectOptions::new()
            .filename(dir.join(format!("{name}.db")))
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
        for s in statements {
            sqlx::query(s).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn executes_select_and_materializes_rows() {
        let dir = tempfile::tempdir().unwrap();
        seed_database(
            dir.path(),
            "acme",
            &[
                "CREATE TABLE welds (JointID TEXT, WeldDate TEXT)",
                "INSERT INTO welds VALUES ('W-1', '2026-01-10'), ('W-2', '2026-02-11')",
            ],
        )
        .await;

        let executor = QueryExecutor::new(dir.path());
        let results = executor
            .execute(
                &query("SELECT JointID, WeldDate FROM welds ORDER BY JointID"),
                &TenantContext::new("acme"),
            )
            .await
            .unwrap();

        assert_eq!(results.columns, vec!["JointID", "WeldDate"]);
        assert_eq!(results.rows.len(), 2);
        assert_eq!(results.rows[0][0], Value::String("W-1".into()));
    }

    #[tokio::test]
    async fn zero_rows_is_success_with_column_names() {
        let dir = tempfile::tempdir().unwrap();
        seed_database(
            dir.path(),
            "acme",
            &["CREATE TABLE welds (JointID TEXT, WeldDate TEXT)"],
        )
        .await;

        let executor = QueryExecutor::new(dir.path());
        let results = executor
            .execute(
                &query("SELECT JointID FROM welds"),
                &TenantContext::new("acme"),
            )
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(results.columns, vec!["JointID"]);
    }

    #[tokio::test]
    async fn nonexistent_database_is_an_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = QueryExecutor::new(dir.path());

        let err = executor
            .execute(&query("SELECT 1"), &TenantContext::new("missing"))
            .await
            .unwrap_err();
        assert!(err.message.contains("missing"));
    }

    #[tokio::test]
    async fn empty_statement_is_an_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        seed_database(dir.path(), "acme", &["CREATE TABLE t (x INTEGER)"]).await;

        let executor = QueryExecutor::new(dir.path());
        let result = executor
            .execute(&query(""), &TenantContext::new("acme"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn write_statements_surface_database_errors() {
        let dir = tempfile::tempdir().unwrap();
        seed_database(dir.path(), "acme", &["CREATE TABLE t (x INTEGER)"]).await;

        // The executor does not re-validate sanitization; the read-only
        // connection rejects the write at the database level.
        let executor = QueryExecutor::new(dir.path());
        let result = executor
            .execute(&query("DELETE FROM t"), &TenantContext::new("acme"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn blob_cells_are_base64_encoded() {
        let dir = tempfile::tempdir().unwrap();
        seed_database(
            dir.path(),
            "acme",
            &[
                "CREATE TABLE docs (BinaryString BLOB)",
                "INSERT INTO docs VALUES (x'255044462d312e34')",
            ],
        )
        .await;

        let executor = QueryExecutor::new(dir.path());
        let results = executor
            .execute(
                &query("SELECT BinaryString FROM docs"),
                &TenantContext::new("acme"),
            )
            .await
            .unwrap();

        let Value::String(encoded) = &results.rows[0][0] else {
            panic!("expected base64 string cell");
        };
        assert_eq!(BASE64.decode(encoded).unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn path_like_database_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let executor = QueryExecutor::new(dir.path());

        let err = executor
            .execute(&query("SELECT 1"), &TenantContext::new("../etc/passwd"))
            .await
            .unwrap_err();
        assert!(err.message.contains("invalid database name"));
    }

    #[tokio::test]
    async fn null_and_numeric_cells_decode() {
        let dir = tempfile::tempdir().unwrap();
        seed_database(
            dir.path(),
            "acme",
            &[
                "CREATE TABLE m (n INTEGER, r REAL, t TEXT)",
                "INSERT INTO m VALUES (134, 0.25, NULL)",
            ],
        )
        .await;

        let executor = QueryExecutor::new(dir.path());
        let results = executor
            .execute(
                &query("SELECT n, r, t FROM m"),
                &TenantContext::new("acme"),
            )
            .await
            .unwrap();

        assert_eq!(results.rows[0][0], Value::Number(134.into()));
        assert_eq!(results.rows[0][1].as_f64(), Some(0.25));
        assert_eq!(results.rows[0][2], Value::Null);
    }
}
