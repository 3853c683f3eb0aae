use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Row as SqlxRow};
use tracing::debug;

use super::capability::{
    Capability, MultiSchema, QueryValidation, QueryValidator,
};
use super::connector::{
    mask_url, with_limit, ColumnInfo, ConnectionInfo, DataSourceConnection, ParamMap, QueryResult,
    TableSchema, UpdateResult,
};
use super::factory::authenticated_url;
use crate::error::CoreError;
use crate::models::{DataSourceConfig, DataSourceKind};
use crate::template::render;

const CAPABILITIES: &[Capability] = &[Capability::MultiSchema, Capability::QueryValidation];

pub struct PostgresConnection {
    pool: PgPool,
    info: ConnectionInfo,
}

impl PostgresConnection {
    pub async fn open(config: &DataSourceConfig) -> Result<Self, CoreError> {
        let url = authenticated_url(config)?;
        let sizing = &config.pool;

        let pool = PgPoolOptions::new()
            .min_connections(sizing.min_connections)
            .max_connections(sizing.max_connections)
            .idle_timeout(Duration::from_secs(sizing.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(sizing.max_lifetime_secs))
            .acquire_timeout(Duration::from_secs(sizing.acquire_timeout_secs))
            .connect(&url)
            .await
            .map_err(|e| CoreError::Connection(format!("Failed to connect to PostgreSQL: {}", e)))?;

        debug!("Opened PostgreSQL pool for {}", mask_url(&url));

        Ok(Self {
            pool,
            info: ConnectionInfo {
                kind: DataSourceKind::Postgres,
                url: mask_url(&url),
                database: config.database.clone(),
            },
        })
    }

    fn decode_row(row: &PgRow, column_count: usize) -> Vec<Value> {
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
            } else if let Ok(v) = row.try_get::<f32, _>(i) {
                Value::from(v)
            } else if let Ok(v) = row.try_get::<bool, _>(i) {
                Value::Bool(v)
            } else if let Ok(v) = row.try_get::<uuid::Uuid, _>(i) {
                Value::String(v.to_string())
            } else if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(i) {
                Value::String(v.to_rfc3339())
            } else if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(i) {
                Value::String(v.to_string())
            } else if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(i) {
                Value::String(v.to_string())
            } else if let Ok(v) = row.try_get::<Value, _>(i) {
                v
            } else {
                Value::Null
            };
            values.push(value);
        }
        values
    }
}

#[async_trait]
impl DataSourceConnection for PostgresConnection {
    fn kind(&self) -> DataSourceKind {
        DataSourceKind::Postgres
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
            "SELECT table_name
             FROM information_schema.tables
             WHERE table_schema = 'public'
               AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Execution(e.to_string()))?;

        Ok(rows.iter().map(|row| row.get("table_name")).collect())
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema, CoreError> {
        let rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable
             FROM information_schema.columns
             WHERE table_name = $1
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Execution(e.to_string()))?;

        let columns = rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get("column_name"),
                data_type: row.get("data_type"),
                nullable: row.get::<String, _>("is_nullable") == "YES",
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

    fn as_multi_schema(&self) -> Option<&dyn MultiSchema> {
        Some(self)
    }

    fn as_query_validator(&self) -> Option<&dyn QueryValidator> {
        Some(self)
    }
}

#[async_trait]
impl MultiSchema for PostgresConnection {
    async fn list_schemas(&self) -> Result<Vec<String>, CoreError> {
        let rows = sqlx::query(
            "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Execution(e.to_string()))?;

        Ok(rows.iter().map(|row| row.get("schema_name")).collect())
    }

    async fn tables_in(
        &self,
        _database: Option<&str>,
        schema: &str,
    ) -> Result<Vec<String>, CoreError> {
        let rows = sqlx::query(
            "SELECT table_name
             FROM information_schema.tables
             WHERE table_schema = $1
             ORDER BY table_name",
        )
        .bind(schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Execution(e.to_string()))?;

        Ok(rows.iter().map(|row| row.get("table_name")).collect())
    }
}

#[async_trait]
impl QueryValidator for PostgresConnection {
    async fn validate(&self, query: &str) -> QueryValidation {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return QueryValidation::failed(e.to_string()),
        };

        match (&mut *conn).prepare(query).await {
            Ok(_) => QueryValidation::ok(),
            Err(e) => {
                let text = e.to_string();
                let mut validation = QueryValidation::failed(text.clone());
                // Server errors report a 1-based character offset.
                if let Some(rest) = text.split("at character ").nth(1) {
                    let digits: String =
                        rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                    validation.column = digits.parse().ok();
                }
                validation
            }
        }
    }
}
