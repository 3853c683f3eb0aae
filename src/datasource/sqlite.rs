use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row as SqlxRow};
use tracing::debug;

use super::capability::{Capability, QueryValidation, QueryValidator};
use super::connector::{
    with_limit, ColumnInfo, ConnectionInfo, DataSourceConnection, ParamMap, QueryResult,
    TableSchema, UpdateResult,
};
use super::factory::build_connection_url;
use crate::error::CoreError;
use crate::models::{DataSourceConfig, DataSourceKind};
use crate::template::render;

const CAPABILITIES: &[Capability] = &[Capability::QueryValidation];

pub struct SqliteConnection {
    pool: SqlitePool,
    info: ConnectionInfo,
}

impl SqliteConnection {
    pub async fn open(config: &DataSourceConfig) -> Result<Self, CoreError> {
        let url = build_connection_url(config)?;
        let sizing = &config.pool;

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| CoreError::Configuration(format!("Invalid SQLite path: {}", e)))?
            .create_if_missing(config.bool_property("create_if_missing"));

        let pool = SqlitePoolOptions::new()
            .min_connections(sizing.min_connections)
            .max_connections(sizing.max_connections)
            .idle_timeout(Duration::from_secs(sizing.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(sizing.max_lifetime_secs))
            .acquire_timeout(Duration::from_secs(sizing.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| CoreError::Connection(format!("Failed to open SQLite: {}", e)))?;

        debug!("Opened SQLite pool for {}", url);

        Ok(Self {
            pool,
            info: ConnectionInfo {
                kind: DataSourceKind::Sqlite,
                url,
                database: config.database.clone(),
            },
        })
    }

    fn decode_row(row: &SqliteRow, column_count: usize) -> Vec<Value> {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value = if let Ok(v) = row.try_get::<String, _>(i) {
                Value::String(v)
            } else if let Ok(v) = row.try_get::<i32, _>(i) {
                Value::from(v)
            } else if let Ok(v) = row.try_get::<i64, _>(i) {
                Value::from(v)
            } else if let Ok(v) = row.try_get::<f64, _>(i) {
                Value::from(v)
            } else if let Ok(v) = row.try_get::<bool, _>(i) {
                Value::Bool(v)
            } else {
                Value::Null
            };
            values.push(value);
        }
        values
    }
}

#[async_trait]
impl DataSourceConnection for SqliteConnection {
    fn kind(&self) -> DataSourceKind {
        DataSourceKind::Sqlite
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn is_valid(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn execute_query(&self, template: &str, params: &ParamMap, limit: i64) -> QueryResult {
        let sql = with_limit(&render(template, params), limit);
        let started = Instant::now();

        match sqlx::query(&sql).fetch_all(&self.pool).await {
            Ok(rows) => {
                if rows.is_empty() {
                    return QueryResult::success(Vec::new(), Vec::new(), started);
                }
                let columns: Vec<String> = rows[0]
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
                let data = rows
                    .iter()
                    .map(|row| Self::decode_row(row, columns.len()))
                    .collect();
                QueryResult::success(columns, data, started)
            }
            Err(e) => QueryResult::failure(e.to_string(), started),
        }
    }

    async fn execute_update(&self, template: &str, params: &ParamMap) -> UpdateResult {
        let sql = render(template, params);
        let started = Instant::now();

        match sqlx::query(&sql).execute(&self.pool).await {
            Ok(done) => UpdateResult::success(done.rows_affected(), started),
            Err(e) => UpdateResult::failure(e.to_string(), started),
        }
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.info.clone()
    }

    async fn list_tables(&self) -> Result<Vec<String>, CoreError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Execution(e.to_string()))?;

        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema, CoreError> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Execution(e.to_string()))?;

        let columns = rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get("name"),
                data_type: row.get("type"),
                nullable: row.get::<i32, _>("notnull") == 0,
            })
            .collect();

        Ok(TableSchema {
            table: table.to_string(),
            columns,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn as_query_validator(&self) -> Option<&dyn QueryValidator> {
        Some(self)
    }
}

#[async_trait]
impl QueryValidator for SqliteConnection {
    async fn validate(&self, query: &str) -> QueryValidation {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return QueryValidation::failed(e.to_string()),
        };

        match (&mut *conn).prepare(query).await {
            Ok(_) => QueryValidation::ok(),
            Err(e) => QueryValidation::failed(e.to_string()),
        }
    }
}
