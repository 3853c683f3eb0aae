use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tiberius::{AuthMethod, Client, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::capability::{Capability, MultiDatabase};
use super::connector::{
    ColumnInfo, ConnectionInfo, DataSourceConnection, ParamMap, QueryResult, TableSchema,
    UpdateResult,
};
use super::factory::build_connection_url;
use super::pool::{ConnectionPool, PoolSettings, PoolableResource};
use crate::error::CoreError;
use crate::models::{DataSourceConfig, DataSourceKind};
use crate::template::render;

const CAPABILITIES: &[Capability] = &[Capability::MultiDatabase];

pub struct MssqlClient {
    client: Client<Compat<TcpStream>>,
}

#[async_trait]
impl PoolableResource for MssqlClient {
    async fn is_valid(&mut self) -> bool {
        match self.client.simple_query("SELECT 1").await {
            Ok(stream) => stream.into_results().await.is_ok(),
            Err(_) => false,
        }
    }

    async fn close(&mut self) {
        // Dropping the client closes the TDS socket.
        debug!("Retiring SQL Server connection");
    }
}

async fn connect_raw(config: tiberius::Config, server: String) -> Result<MssqlClient, CoreError> {
    let tcp = TcpStream::connect(&server)
        .await
        .map_err(|e| CoreError::Connection(format!("Failed to reach SQL Server: {}", e)))?;
    tcp.set_nodelay(true)
        .map_err(|e| CoreError::Connection(e.to_string()))?;

    let client = Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| CoreError::Connection(format!("SQL Server handshake failed: {}", e)))?;

    Ok(MssqlClient { client })
}

/// SQL Server connector. tiberius ships no pool of its own, so connections
/// live in this crate's bounded pool.
pub struct SqlServerConnection {
    pool: ConnectionPool<MssqlClient>,
    info: ConnectionInfo,
    config: DataSourceConfig,
}

impl SqlServerConnection {
    pub async fn open(config: &DataSourceConfig) -> Result<Self, CoreError> {
        let mut tib = tiberius::Config::new();
        tib.authentication(AuthMethod::sql_server(
            config.username.as_deref().unwrap_or("sa"),
            config.password.as_deref().unwrap_or(""),
        ));
        if let Some(database) = &config.database {
            tib.database(database);
        }
        if config.bool_property("trust_server_certificate") {
            tib.trust_cert();
        }
        if !config.use_tls {
            tib.encryption(EncryptionLevel::Off);
        }

        let server = format!("{}:{}", config.host, config.port);
        let pool = ConnectionPool::open(
            PoolSettings::from(&config.pool),
            Box::new({
                let server = server.clone();
                move || Box::pin(connect_raw(tib.clone(), server.clone()))
            }),
        )
        .await;

        // Establishment failures belong to factory time, not first use.
        let probe = pool.acquire().await?;
        pool.release(probe).await;

        Ok(Self {
            pool,
            info: ConnectionInfo {
                kind: DataSourceKind::SqlServer,
                url: build_connection_url(config)?,
                database: config.database.clone(),
            },
            config: config.clone(),
        })
    }

    /// SQL Server caps rows with TOP rather than LIMIT.
    fn with_top(sql: &str, limit: i64) -> String {
        let lower = sql.to_lowercase();
        if limit <= 0 || lower.contains(" top ") || lower.contains("limit") {
            sql.to_string()
        } else if let Some(rest) = sql.get(7..).filter(|_| lower.starts_with("select ")) {
            format!("SELECT TOP {} {}", limit, rest)
        } else {
            sql.to_string()
        }
    }

    fn decode_row(row: &tiberius::Row) -> Vec<Value> {
        let mut values = Vec::with_capacity(row.columns().len());
        for i in 0..row.columns().len() {
            let value = if let Ok(Some(v)) = row.try_get::<&str, _>(i) {
                Value::String(v.to_string())
            } else if let Ok(Some(v)) = row.try_get::<i32, _>(i) {
                Value::from(v)
            } else if let Ok(Some(v)) = row.try_get::<i64, _>(i) {
                Value::from(v)
            } else if let Ok(Some(v)) = row.try_get::<f64, _>(i) {
                Value::from(v)
            } else if let Ok(Some(v)) = row.try_get::<f32, _>(i) {
                Value::from(v)
            } else if let Ok(Some(v)) = row.try_get::<bool, _>(i) {
                Value::Bool(v)
            } else if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(i) {
                Value::String(v.to_string())
            } else {
                Value::Null
            };
            values.push(value);
        }
        values
    }

    async fn fetch_rows(&self, sql: &str, started: Instant) -> QueryResult {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return QueryResult::failure(e.to_string(), started),
        };

        let result = match conn.client.simple_query(sql).await {
            Ok(stream) => match stream.into_results().await {
                Ok(result_sets) => {
                    let rows = result_sets.into_iter().next().unwrap_or_default();
                    if rows.is_empty() {
                        QueryResult::success(Vec::new(), Vec::new(), started)
                    } else {
                        let columns: Vec<String> = rows[0]
                            .columns()
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect();
                        let data = rows.iter().map(Self::decode_row).collect();
                        QueryResult::success(columns, data, started)
                    }
                }
                Err(e) => QueryResult::failure(e.to_string(), started),
            },
            Err(e) => QueryResult::failure(e.to_string(), started),
        };

        self.pool.release(conn).await;
        result
    }
}

#[async_trait]
impl DataSourceConnection for SqlServerConnection {
    fn kind(&self) -> DataSourceKind {
        DataSourceKind::SqlServer
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn is_valid(&self) -> bool {
        match self.pool.acquire().await {
            Ok(conn) => {
                // Acquire already re-validates idle connections.
                self.pool.release(conn).await;
                true
            }
            Err(_) => false,
        }
    }

    async fn execute_query(&self, template: &str, params: &ParamMap, limit: i64) -> QueryResult {
        let sql = Self::with_top(&render(template, params), limit);
        let started = Instant::now();
        self.fetch_rows(&sql, started).await
    }

    async fn execute_update(&self, template: &str, params: &ParamMap) -> UpdateResult {
        let sql = render(template, params);
        let started = Instant::now();

        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return UpdateResult::failure(e.to_string(), started),
        };

        let result = match conn.client.execute(sql.as_str(), &[]).await {
            Ok(done) => UpdateResult::success(done.total(), started),
            Err(e) => UpdateResult::failure(e.to_string(), started),
        };

        self.pool.release(conn).await;
        result
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.info.clone()
    }

    async fn list_tables(&self) -> Result<Vec<String>, CoreError> {
        let result = self
            .fetch_rows(
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
                Instant::now(),
            )
            .await;
        if !result.ok {
            return Err(CoreError::Execution(
                result.error.unwrap_or_else(|| "query failed".into()),
            ));
        }
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|v| v.as_str().map(String::from))
            .collect())
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema, CoreError> {
        let sql = format!(
            "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE \
             FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = '{}' \
             ORDER BY ORDINAL_POSITION",
            table
        );
        let result = self.fetch_rows(&sql, Instant::now()).await;
        if !result.ok {
            return Err(CoreError::Execution(
                result.error.unwrap_or_else(|| "query failed".into()),
            ));
        }

        let columns = result
            .rows
            .into_iter()
            .filter_map(|row| {
                let mut cells = row.into_iter();
                let name = cells.next()?.as_str()?.to_string();
                let data_type = cells.next()?.as_str()?.to_string();
                let nullable = cells.next()?.as_str().map(|v| v == "YES").unwrap_or(false);
                Some(ColumnInfo {
                    name,
                    data_type,
                    nullable,
                })
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
}

#[async_trait]
impl MultiDatabase for SqlServerConnection {
    async fn list_databases(&self) -> Result<Vec<String>, CoreError> {
        let result = self
            .fetch_rows("SELECT name FROM sys.databases ORDER BY name", Instant::now())
            .await;
        if !result.ok {
            return Err(CoreError::Execution(
                result.error.unwrap_or_else(|| "query failed".into()),
            ));
        }
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|v| v.as_str().map(String::from))
            .collect())
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
