use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, Row as SqlxRow};
use tracing::debug;

use super::capability::{
    Capability, MultiDatabase, QueryValidation, QueryValidator,
};
use super::connector::{
    mask_url, with_limit, ColumnInfo, ConnectionInfo, DataSourceConnection, ParamMap, QueryResult,
    TableSchema, UpdateResult,
};
use super::factory::authenticated_url;
use crate::error::CoreError;
use crate::models::{DataSourceConfig, DataSourceKind};
use crate::template::render;

const CAPABILITIES: &[Capability] = &[Capability::MultiDatabase, Capability::QueryValidation];

pub struct MySqlConnection {
    pool: MySqlPool,
    info: ConnectionInfo,
    config: DataSourceConfig,
}

impl MySqlConnection {
    pub async fn open(config: &DataSourceConfig) -> Result<Self, CoreError> {
        let url = authenticated_url(config)?;
        let sizing = &config.pool;

        let pool = MySqlPoolOptions::new()
            .min_connections(sizing.min_connections)
            .max_connections(sizing.max_connections)
            .idle_timeout(Duration::from_secs(sizing.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(sizing.max_lifetime_secs))
            .acquire_timeout(Duration::from_secs(sizing.acquire_timeout_secs))
            .connect(&url)
            .await
            .map_err(|e| CoreError::Connection(format!("Failed to connect to MySQL: {}", e)))?;

        debug!("Opened MySQL pool for {}", mask_url(&url));

        Ok(Self {
            pool,
            info: ConnectionInfo {
                kind: DataSourceKind::MySql,
                url: mask_url(&url),
                database: config.database.clone(),
            },
            config: config.clone(),
        })
    }

    fn decode_row(row: &MySqlRow, column_count: usize) -> Vec<Value> {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value = if let Ok(v) = row.try_get::<String, _>(i) {
                Value::String(v)
            } else if let Ok(v) = row.try_get::<i32, _>(i) {
                Value::from(v)
            } else if let Ok(v) = row.try_get::<i64, _>(i) {
                Value::from(v)
            } else if let Ok(v) = row.try_get::<u64, _>(i) {
                Value::from(v)
            } else if let Ok(v) = row.try_get::<f64, _>(i) {
                Value::from(v)
            } else if let Ok(v) = row.try_get::<f32, _>(i) {
                Value::from(v)
            } else if let Ok(v) = row.try_get::<bool, _>(i) {
                Value::Bool(v)
            } else if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(i) {
                Value::String(v.to_string())
            } else if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(i) {
                Value::String(v.to_string())
            } else {
                Value::Null
            };
            values.push(value);
        }
        values
    }
}

#[async_trait]
impl DataSourceConnection for MySqlConnection {
    fn kind(&self) -> DataSourceKind {
        DataSourceKind::MySql
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
        let rows = sqlx::query("SHOW TABLES")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Execution(e.to_string()))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema, CoreError> {
        let rows = sqlx::query(
            "SELECT COLUMN_NAME as column_name,
                    DATA_TYPE as data_type,
                    IS_NULLABLE as is_nullable
             FROM INFORMATION_SCHEMA.COLUMNS
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
             ORDER BY ORDINAL_POSITION",
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

    fn as_multi_database(&self) -> Option<&dyn MultiDatabase> {
        Some(self)
    }

    fn as_query_validator(&self) -> Option<&dyn QueryValidator> {
        Some(self)
    }
}

#[async_trait]
impl MultiDatabase for MySqlConnection {
    async fn list_databases(&self) -> Result<Vec<String>, CoreError> {
        let rows = sqlx::query("SHOW DATABASES")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Execution(e.to_string()))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
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

#[async_trait]
impl QueryValidator for MySqlConnection {
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
                // MySQL syntax errors mention "at line N".
                if let Some(rest) = text.split("at line ").nth(1) {
                    let digits: String =
                        rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                    validation.line = digits.parse().ok();
                }
                validation
            }
        }
    }
}
