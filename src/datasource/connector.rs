use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::capability::{Capability, MultiDatabase, MultiSchema, QueryValidator};
use crate::error::CoreError;
use crate::models::DataSourceKind;

/// Bound parameter map for a single execution.
pub type ParamMap = serde_json::Map<String, Value>;

/// Uniform tabular result returned by every backend.
///
/// Driver and network failures land here as `ok = false` with the backend's
/// error text; they do not cross the trait boundary as `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub ok: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn success(columns: Vec<String>, rows: Vec<Vec<Value>>, started: Instant) -> Self {
        let row_count = rows.len();
        Self {
            ok: true,
            columns,
            rows,
            row_count,
            elapsed_ms: elapsed_ms(started),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, started: Instant) -> Self {
        Self {
            ok: false,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            elapsed_ms: elapsed_ms(started),
            error: Some(error.into()),
        }
    }
}

/// Result of a mutating command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResult {
    pub ok: bool,
    pub affected: u64,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateResult {
    pub fn success(affected: u64, started: Instant) -> Self {
        Self {
            ok: true,
            affected,
            elapsed_ms: elapsed_ms(started),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, started: Instant) -> Self {
        Self {
            ok: false,
            affected: 0,
            elapsed_ms: elapsed_ms(started),
            error: Some(error.into()),
        }
    }
}

/// Descriptive info about a live connection; URLs are credential-masked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub kind: DataSourceKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

/// The capability-oriented contract every backend connection implements.
///
/// Establishment failures fail fast at factory time; once a connection
/// exists, query/update failures surface inside the result. `close` is
/// idempotent.
#[async_trait]
pub trait DataSourceConnection: Send + Sync {
    fn kind(&self) -> DataSourceKind;

    /// Optional capabilities this connection supports.
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Cheap liveness probe.
    async fn is_valid(&self) -> bool;

    /// Render `${name}` placeholders from `params` and execute. `limit` caps
    /// the row count when the text carries no limit of its own (0 disables
    /// the guard).
    async fn execute_query(&self, template: &str, params: &ParamMap, limit: i64) -> QueryResult;

    /// Render placeholders and execute a mutating command.
    async fn execute_update(&self, template: &str, params: &ParamMap) -> UpdateResult;

    fn connection_info(&self) -> ConnectionInfo;

    async fn list_tables(&self) -> Result<Vec<String>, CoreError>;

    async fn table_schema(&self, table: &str) -> Result<TableSchema, CoreError>;

    async fn close(&self);

    fn as_multi_database(&self) -> Option<&dyn MultiDatabase> {
        None
    }

    fn as_multi_schema(&self) -> Option<&dyn MultiSchema> {
        None
    }

    fn as_query_validator(&self) -> Option<&dyn QueryValidator> {
        None
    }
}

pub fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Append the row-limit guard when the text has no limit of its own.
pub fn with_limit(query: &str, limit: i64) -> String {
    if limit <= 0 || query.to_lowercase().contains("limit") {
        query.to_string()
    } else {
        format!("{} LIMIT {}", query, limit)
    }
}

/// Hide credentials in a connection URL for logs and info payloads.
pub fn mask_url(url: &str) -> String {
    if !url.contains('@') {
        return url.to_string();
    }
    let parts: Vec<&str> = url.splitn(2, "://").collect();
    if parts.len() != 2 {
        return url.to_string();
    }
    let auth_and_rest: Vec<&str> = parts[1].splitn(2, '@').collect();
    if auth_and_rest.len() != 2 {
        return url.to_string();
    }
    let auth_parts: Vec<&str> = auth_and_rest[0].splitn(2, ':').collect();
    if auth_parts.len() == 2 {
        format!("{}://{}:***@{}", parts[0], auth_parts[0], auth_and_rest[1])
    } else {
        format!("{}://{}@{}", parts[0], auth_parts[0], auth_and_rest[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_url_hides_password_only() {
        assert_eq!(
            mask_url("postgres://svc:hunter2@db:5432/app"),
            "postgres://svc:***@db:5432/app"
        );
        assert_eq!(
            mask_url("postgres://svc@db:5432/app"),
            "postgres://svc@db:5432/app"
        );
        assert_eq!(mask_url("sqlite:/data/app.db"), "sqlite:/data/app.db");
    }

    #[test]
    fn with_limit_respects_existing_limit() {
        assert_eq!(
            with_limit("SELECT * FROM t LIMIT 5", 100),
            "SELECT * FROM t LIMIT 5"
        );
        assert_eq!(with_limit("SELECT * FROM t", 100), "SELECT * FROM t LIMIT 100");
        assert_eq!(with_limit("SELECT * FROM t", 0), "SELECT * FROM t");
    }

    #[test]
    fn failure_results_carry_error_and_timing() {
        let started = Instant::now();
        let result = QueryResult::failure("connection reset", started);
        assert!(!result.ok);
        assert_eq!(result.row_count, 0);
        assert_eq!(result.error.as_deref(), Some("connection reset"));
    }
}
