use std::time::Instant;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::{options::ClientOptions, Client};
use serde_json::Value;
use tracing::debug;

use super::capability::{Capability, MultiDatabase};
use super::connector::{
    mask_url, ColumnInfo, ConnectionInfo, DataSourceConnection, ParamMap, QueryResult,
    TableSchema, UpdateResult,
};
use super::factory::authenticated_url;
use crate::error::CoreError;
use crate::models::{DataSourceConfig, DataSourceKind};
use crate::template::render;

const CAPABILITIES: &[Capability] = &[Capability::MultiDatabase];

/// MongoDB connector. Query text is a database command document (e.g.
/// `{"find": "users", "filter": {...}}`) rendered through the template
/// engine, then run via `runCommand`.
pub struct MongoDbConnection {
    client: Client,
    database: String,
    info: ConnectionInfo,
    config: DataSourceConfig,
}

impl MongoDbConnection {
    pub async fn open(config: &DataSourceConfig) -> Result<Self, CoreError> {
        let url = authenticated_url(config)?;
        let database = config
            .database
            .clone()
            .ok_or_else(|| CoreError::Configuration("MongoDB requires a database name".into()))?;

        let options = ClientOptions::parse(&url)
            .await
            .map_err(|e| CoreError::Configuration(format!("Invalid MongoDB URL: {}", e)))?;
        let client = Client::with_options(options)
            .map_err(|e| CoreError::Connection(format!("Failed to build MongoDB client: {}", e)))?;

        let connection = Self {
            client,
            database,
            info: ConnectionInfo {
                kind: DataSourceKind::MongoDb,
                url: mask_url(&url),
                database: config.database.clone(),
            },
            config: config.clone(),
        };

        // The driver connects lazily; ping so establishment failures surface
        // at factory time.
        if !connection.is_valid().await {
            return Err(CoreError::Connection(format!(
                "MongoDB at {} did not answer the ping",
                connection.info.url
            )));
        }

        debug!("Opened MongoDB client for {}", connection.info.url);
        Ok(connection)
    }

    fn parse_command(text: &str) -> Result<Document, CoreError> {
        let json: Value = serde_json::from_str(text).map_err(|e| {
            CoreError::QueryRejected(format!("Command is not valid JSON: {}", e))
        })?;
        bson::to_document(&json)
            .map_err(|e| CoreError::QueryRejected(format!("Command is not a document: {}", e)))
    }

    /// Flatten a command reply into the uniform tabular shape. Cursor replies
    /// contribute one row per batch document; anything else collapses to a
    /// single `result` cell.
    fn tabularize(reply: Document, started: Instant) -> QueryResult {
        let batch = reply
            .get_document("cursor")
            .ok()
            .and_then(|cursor| cursor.get_array("firstBatch").ok())
            .cloned();

        let Some(batch) = batch else {
            let value = Bson::Document(reply).into_relaxed_extjson();
            return QueryResult::success(
                vec!["result".to_string()],
                vec![vec![value]],
                started,
            );
        };

        let docs: Vec<Document> = batch
            .into_iter()
            .filter_map(|item| match item {
                Bson::Document(doc) => Some(doc),
                _ => None,
            })
            .collect();

        if docs.is_empty() {
            return QueryResult::success(Vec::new(), Vec::new(), started);
        }

        let columns: Vec<String> = docs[0].keys().map(|key| key.to_string()).collect();
        let rows = docs
            .into_iter()
            .map(|doc| {
                columns
                    .iter()
                    .map(|key| {
                        doc.get(key)
                            .cloned()
                            .map(Bson::into_relaxed_extjson)
                            .unwrap_or(Value::Null)
                    })
                    .collect()
            })
            .collect();

        QueryResult::success(columns, rows, started)
    }

    fn bson_type_name(value: &Bson) -> &'static str {
        match value {
            Bson::String(_) => "string",
            Bson::Int32(_) | Bson::Int64(_) => "int",
            Bson::Double(_) => "double",
            Bson::Boolean(_) => "bool",
            Bson::DateTime(_) => "date",
            Bson::ObjectId(_) => "objectId",
            Bson::Array(_) => "array",
            Bson::Document(_) => "object",
            Bson::Null => "null",
            _ => "mixed",
        }
    }
}

#[async_trait]
impl DataSourceConnection for MongoDbConnection {
    fn kind(&self) -> DataSourceKind {
        DataSourceKind::MongoDb
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn is_valid(&self) -> bool {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .is_ok()
    }

    async fn execute_query(&self, template: &str, params: &ParamMap, _limit: i64) -> QueryResult {
        let rendered = render(template, params);
        let started = Instant::now();

        let command = match Self::parse_command(&rendered) {
            Ok(command) => command,
            Err(e) => return QueryResult::failure(e.to_string(), started),
        };

        match self
            .client
            .database(&self.database)
            .run_command(command)
            .await
        {
            Ok(reply) => Self::tabularize(reply, started),
            Err(e) => QueryResult::failure(e.to_string(), started),
        }
    }

    async fn execute_update(&self, template: &str, params: &ParamMap) -> UpdateResult {
        let rendered = render(template, params);
        let started = Instant::now();

        let command = match Self::parse_command(&rendered) {
            Ok(command) => command,
            Err(e) => return UpdateResult::failure(e.to_string(), started),
        };

        match self
            .client
            .database(&self.database)
            .run_command(command)
            .await
        {
            Ok(reply) => {
                let affected = reply
                    .get("nModified")
                    .or_else(|| reply.get("n"))
                    .and_then(Bson::as_i64)
                    .or_else(|| {
                        reply
                            .get("nModified")
                            .or_else(|| reply.get("n"))
                            .and_then(Bson::as_i32)
                            .map(i64::from)
                    })
                    .unwrap_or(0);
                UpdateResult::success(affected.max(0) as u64, started)
            }
            Err(e) => UpdateResult::failure(e.to_string(), started),
        }
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.info.clone()
    }

    async fn list_tables(&self) -> Result<Vec<String>, CoreError> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(|e| CoreError::Execution(e.to_string()))
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema, CoreError> {
        // Collections are schemaless; sample one document and report its
        // fields.
        let sample = self
            .client
            .database(&self.database)
            .collection::<Document>(table)
            .find_one(doc! {})
            .await
            .map_err(|e| CoreError::Execution(e.to_string()))?;

        let columns = sample
            .map(|doc| {
                doc.iter()
                    .map(|(name, value)| ColumnInfo {
                        name: name.to_string(),
                        data_type: Self::bson_type_name(value).to_string(),
                        nullable: true,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(TableSchema {
            table: table.to_string(),
            columns,
        })
    }

    async fn close(&self) {
        // The driver tears its topology down when the last clone drops.
        debug!("Closing MongoDB client for {}", self.info.url);
    }

    fn as_multi_database(&self) -> Option<&dyn MultiDatabase> {
        Some(self)
    }
}

#[async_trait]
impl MultiDatabase for MongoDbConnection {
    async fn list_databases(&self) -> Result<Vec<String>, CoreError> {
        self.client
            .list_database_names()
            .await
            .map_err(|e| CoreError::Execution(e.to_string()))
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
