use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::connector::DataSourceConnection;
use crate::error::CoreError;

/// Optional behaviors a connection may support beyond the base contract.
///
/// Callers probe with `DataSourceConnection::supports` (or the `as_*`
/// accessors) before invoking; absence is "not applicable", never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    MultiDatabase,
    MultiSchema,
    QueryValidation,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::MultiDatabase => write!(f, "multi-database"),
            Capability::MultiSchema => write!(f, "multi-schema"),
            Capability::QueryValidation => write!(f, "query-validation"),
        }
    }
}

/// Connections aware of sibling databases on the same server.
#[async_trait]
pub trait MultiDatabase: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<String>, CoreError>;

    /// Switch to another database on the same server.
    ///
    /// Pooled connections cannot retarget in place, so this returns a fresh
    /// connection bound to the named database.
    async fn use_database(&self, database: &str)
        -> Result<Box<dyn DataSourceConnection>, CoreError>;
}

/// Connections aware of schemas within a database.
#[async_trait]
pub trait MultiSchema: Send + Sync {
    async fn list_schemas(&self) -> Result<Vec<String>, CoreError>;

    async fn tables_in(
        &self,
        database: Option<&str>,
        schema: &str,
    ) -> Result<Vec<String>, CoreError>;
}

/// Result of a pre-flight syntax check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl QueryValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
            line: None,
            column: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            line: None,
            column: None,
        }
    }
}

/// Connections that can syntax-check a query server-side without running it.
#[async_trait]
pub trait QueryValidator: Send + Sync {
    async fn validate(&self, query: &str) -> QueryValidation;
}
