use std::time::{Duration, Instant};

use async_trait::async_trait;
use clickhouse::Client;
use serde_json::Value;
use tracing::debug;

use super::capability::{Capability, MultiDatabase};
use super::connector::{
    mask_url, with_limit, ColumnInfo, ConnectionInfo, DataSourceConnection, ParamMap, QueryResult,
    TableSchema, UpdateResult,
};
use crate::error::CoreError;
use crate::models::{DataSourceConfig, DataSourceKind};
use crate::template::render;

const CAPABILITIES: &[Capability] = &[Capability::MultiDatabase];
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// ClickHouse connector. The client speaks HTTP with its own internal
/// connection handling, so one shared client is reused across requests.
pub struct ClickHouseConnection {
    client: Client,
    info: ConnectionInfo,
    config: DataSourceConfig,
}

impl ClickHouseConnection {
    pub async fn open(config: &DataSourceConfig) -> Result<Self, CoreError> {
        let scheme = if config.use_tls { "https" } else { "http" };
        let url = format!("{}://{}:{}", scheme, config.host, config.port);
        let database = config.database.as_deref().unwrap_or("default");

        let mut client = Client::default()
            .with_url(url.clone())
            .with_database(database)
            .with_user(config.username.as_deref().unwrap_or("default"));
        if let Some(password) = &config.password {
            client = client.with_password(password.clone());
        }

        let connection = Self {
            client,
            info: ConnectionInfo {
                kind: DataSourceKind::ClickHouse,
                url: mask_url(&url),
                database: Some(database.to_string()),
            },
            config: config.clone(),
        };

        // The HTTP client is lazy; probe now so establishment failures
        // surface at factory time.
        if !connection.is_valid().await {
            return Err(CoreError::Connection(format!(
                "ClickHouse at {} did not answer the probe",
                connection.info.url
            )));
        }

        debug!("Opened ClickHouse client for {}", connection.info.url);
        Ok(connection)
    }

    /// Parse a `FORMAT JSON` response body into the uniform result shape.
    fn tabularize(body: &str, started: Instant) -> QueryResult {
        let Ok(response) = serde_json::from_str::<Value>(body) else {
            return QueryResult::success(
                vec!["result".to_string()],
                vec![vec![Value::String(body.to_string())]],
                started,
            );
        };

        let meta = response.get("meta").and_then(|m| m.as_array());
        let data = response.get("data").and_then(|d| d.as_array());
        let (Some(meta), Some(data)) = (meta, data) else {
            return QueryResult::success(
                vec!["result".to_string()],
                vec![vec![response]],
                started,
            );
        };

        let columns: Vec<String> = meta
            .iter()
            .filter_map(|col| col.get("name").and_then(|n| n.as_str()))
            .map(String::from)
            .collect();

        let rows = data
            .iter()
            .filter_map(|row| row.as_object())
            .map(|row| {
                columns
                    .iter()
                    .map(|name| row.get(name).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        QueryResult::success(columns, rows, started)
    }
}

#[async_trait]
impl DataSourceConnection for ClickHouseConnection {
    fn kind(&self) -> DataSourceKind {
        DataSourceKind::ClickHouse
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn is_valid(&self) -> bool {
        matches!(
            tokio::time::timeout(
                PROBE_TIMEOUT,
                self.client.query("SELECT 1").fetch_one::<u8>(),
            )
            .await,
            Ok(Ok(_))
        )
    }

    async fn execute_query(&self, template: &str, params: &ParamMap, limit: i64) -> QueryResult {
        let sql = with_limit(&render(template, params), limit);
        let started = Instant::now();

        // FORMAT JSON carries column metadata the typed fetch API hides.
        let with_format = format!("{} FORMAT JSON", sql);
        match self.client.query(&with_format).fetch_one::<String>().await {
            Ok(body) => Self::tabularize(&body, started),
            Err(_) => {
                // Some statements reject FORMAT JSON; retry plain.
                match self.client.query(&sql).fetch_all::<String>().await {
                    Ok(lines) => {
                        let rows = lines
                            .into_iter()
                            .map(|line| vec![Value::String(line)])
                            .collect();
                        QueryResult::success(vec!["result".to_string()], rows, started)
                    }
                    Err(e) => QueryResult::failure(e.to_string(), started),
                }
            }
        }
    }

    async fn execute_update(&self, template: &str, params: &ParamMap) -> UpdateResult {
        let sql = render(template, params);
        let started = Instant::now();

        match self.client.query(&sql).execute().await {
            // ClickHouse does not report affected rows over this interface.
            Ok(()) => UpdateResult::success(0, started),
            Err(e) => UpdateResult::failure(e.to_string(), started),
        }
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.info.clone()
    }

    async fn list_tables(&self) -> Result<Vec<String>, CoreError> {
        let tables: Vec<String> = self
            .client
            .query(
                "SELECT name FROM system.tables \
                 WHERE database = currentDatabase() ORDER BY name",
            )
            .fetch_all()
            .await
            .map_err(|e| CoreError::Execution(e.to_string()))?;
        Ok(tables)
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema, CoreError> {
        let columns: Vec<(String, String)> = self
            .client
            .query(&format!(
                "SELECT name, type FROM system.columns \
                 WHERE database = currentDatabase() AND table = '{}' \
                 ORDER BY position",
                table
            ))
            .fetch_all()
            .await
            .map_err(|e| CoreError::Execution(e.to_string()))?;

        Ok(TableSchema {
            table: table.to_string(),
            columns: columns
                .into_iter()
                .map(|(name, col_type)| ColumnInfo {
                    nullable: col_type.contains("Nullable"),
                    name,
                    data_type: col_type,
                })
                .collect(),
        })
    }

    async fn close(&self) {
        // Stateless HTTP client; nothing to release.
        debug!("Closing ClickHouse client for {}", self.info.url);
    }

    fn as_multi_database(&self) -> Option<&dyn MultiDatabase> {
        Some(self)
    }
}

#[async_trait]
impl MultiDatabase for ClickHouseConnection {
    async fn list_databases(&self) -> Result<Vec<String>, CoreError> {
        let databases: Vec<String> = self
            .client
            .query("SHOW DATABASES")
            .fetch_all()
            .await
            .map_err(|e| CoreError::Execution(e.to_string()))?;
        Ok(databases)
    }

    async fn use_database(
        &self,
        database: &str,
    ) -> Result<Box<dyn DataSourceConnection>, CoreError> {
        let mut config = self.config.clone();
        config.database = Some(database.to_string());
        Ok(Box::new(Self::open(&config).await?))
    }
}
