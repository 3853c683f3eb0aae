use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::audited::AuditedRecord;
use crate::error::CoreError;

/// Supported data-source types.
///
/// The enum carries no behavior; per-type wiring (URL template, default port,
/// driver coordinate, protocol family) lives in the descriptor table in
/// `datasource::registry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    Postgres,
    MySql,
    Sqlite,
    SqlServer,
    ClickHouse,
    MongoDb,
    Elasticsearch,
    HttpApi,
    Neo4j,
    Kafka,
}

impl DataSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceKind::Postgres => "postgres",
            DataSourceKind::MySql => "mysql",
            DataSourceKind::Sqlite => "sqlite",
            DataSourceKind::SqlServer => "sqlserver",
            DataSourceKind::ClickHouse => "clickhouse",
            DataSourceKind::MongoDb => "mongodb",
            DataSourceKind::Elasticsearch => "elasticsearch",
            DataSourceKind::HttpApi => "http-api",
            DataSourceKind::Neo4j => "neo4j",
            DataSourceKind::Kafka => "kafka",
        }
    }
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DataSourceKind::Postgres),
            "mysql" => Ok(DataSourceKind::MySql),
            "sqlite" => Ok(DataSourceKind::Sqlite),
            "sqlserver" | "mssql" => Ok(DataSourceKind::SqlServer),
            "clickhouse" => Ok(DataSourceKind::ClickHouse),
            "mongodb" | "mongo" => Ok(DataSourceKind::MongoDb),
            "elasticsearch" | "es" => Ok(DataSourceKind::Elasticsearch),
            "http" | "http-api" => Ok(DataSourceKind::HttpApi),
            "neo4j" => Ok(DataSourceKind::Neo4j),
            "kafka" => Ok(DataSourceKind::Kafka),
            other => Err(CoreError::Configuration(format!(
                "Unknown data source type '{}'",
                other
            ))),
        }
    }
}

/// How a connection is established and spoken to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolFamily {
    /// Driver opens a stateful wire connection from a URL (relational stores).
    JdbcLike,
    /// Stateless request/response over HTTP.
    Http,
    /// Type-specific native client library.
    Native,
}

/// What kind of system sits behind the connection; drives query shape rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSourceCategory {
    Relational,
    Document,
    Search,
    TimeSeries,
    Graph,
    MessageQueue,
    HttpApi,
}

/// Pool sizing knobs persisted with a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSizing {
    pub min_connections: u32,
    pub max_connections: u32,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
            acquire_timeout_secs: 5,
        }
    }
}

/// A configured external system an API service queries.
///
/// Soft-deleted by flipping `enabled` off; rows referenced by published
/// services are never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub meta: AuditedRecord,
    pub name: String,
    pub kind: DataSourceKind,
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub pool: PoolSizing,
    /// Protocol-specific extras (e.g. `trust_server_certificate`, `base_path`).
    pub properties: BTreeMap<String, String>,
    pub enabled: bool,
}

impl DataSourceConfig {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn bool_property(&self, key: &str) -> bool {
        self.property(key)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }
}
