use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::capability::Capability;
use super::connector::{
    ColumnInfo, ConnectionInfo, DataSourceConnection, ParamMap, QueryResult, TableSchema,
    UpdateResult,
};
use crate::error::CoreError;
use crate::models::{DataSourceConfig, DataSourceKind};
use crate::template::render;

/// Stateless HTTP connector backing both generic HTTP APIs and search
/// engines. Request text is `METHOD /path [json-body]`; each execution is an
/// independent request, nothing is pooled.
pub struct HttpConnection {
    client: reqwest::Client,
    base_url: Url,
    auth_header: Option<String>,
    kind: DataSourceKind,
    info: ConnectionInfo,
}

impl HttpConnection {
    pub fn open(config: &DataSourceConfig) -> Result<Self, CoreError> {
        let scheme = if config.use_tls { "https" } else { "http" };
        let mut base = format!("{}://{}:{}", scheme, config.host, config.port);
        if let Some(path) = config.property("base_path") {
            if !path.starts_with('/') {
                base.push('/');
            }
            base.push_str(path);
        }

        let base_url = Url::parse(&base)
            .map_err(|e| CoreError::Configuration(format!("Invalid base URL '{}': {}", base, e)))?;

        let auth_header = config.username.as_deref().map(|username| {
            let token = BASE64.encode(format!(
                "{}:{}",
                username,
                config.password.as_deref().unwrap_or("")
            ));
            format!("Basic {}", token)
        });

        let timeout = config
            .property("timeout_secs")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| CoreError::Connection(e.to_string()))?;

        debug!("HTTP connector ready for {}", base_url);

        Ok(Self {
            client,
            info: ConnectionInfo {
                kind: config.kind,
                url: base_url.to_string(),
                database: None,
            },
            base_url,
            auth_header,
            kind: config.kind,
        })
    }

    /// Split request text into method, path, and optional body.
    fn parse_request(text: &str) -> Result<(Method, String, Option<Value>), CoreError> {
        let trimmed = text.trim();
        let mut head = trimmed.splitn(2, char::is_whitespace);
        let verb = head.next().unwrap_or("");
        let rest = head.next().unwrap_or("").trim_start();

        let method = match verb.to_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            other => {
                return Err(CoreError::QueryRejected(format!(
                    "Unsupported HTTP verb '{}'",
                    other
                )))
            }
        };

        let (path, body_text) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim_start()),
            None => (rest, ""),
        };
        if path.is_empty() {
            return Err(CoreError::QueryRejected("Request has no path".into()));
        }

        let body = if body_text.is_empty() {
            None
        } else {
            Some(serde_json::from_str(body_text).map_err(|e| {
                CoreError::QueryRejected(format!("Request body is not valid JSON: {}", e))
            })?)
        };

        Ok((method, path.to_string(), body))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(reqwest::StatusCode, String), CoreError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| CoreError::Configuration(format!("Invalid request path: {}", e)))?;

        let mut request = self.client.request(method, url);
        if let Some(header) = &self.auth_header {
            request = request.header(AUTHORIZATION, header.clone());
        }
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Connection(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CoreError::Connection(e.to_string()))?;
        Ok((status, text))
    }

    fn docs_to_table(docs: &[Value], started: Instant) -> QueryResult {
        let Some(first) = docs.first() else {
            return QueryResult::success(Vec::new(), Vec::new(), started);
        };

        let Some(object) = first.as_object() else {
            let rows = docs.iter().map(|v| vec![v.clone()]).collect();
            return QueryResult::success(vec!["value".to_string()], rows, started);
        };

        let columns: Vec<String> = object.keys().cloned().collect();
        let rows = docs
            .iter()
            .map(|doc| {
                columns
                    .iter()
                    .map(|key| doc.get(key).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        QueryResult::success(columns, rows, started)
    }

    /// Shape a response body into the uniform tabular result: JSON arrays
    /// become rows, search hits contribute their source documents, plain
    /// objects become a single row.
    fn tabularize(body: &str, started: Instant) -> QueryResult {
        let Ok(json) = serde_json::from_str::<Value>(body) else {
            return QueryResult::success(
                vec!["response".to_string()],
                vec![vec![Value::String(body.to_string())]],
                started,
            );
        };

        if let Some(items) = json.as_array() {
            return Self::docs_to_table(items, started);
        }

        if let Some(hits) = json
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(|h| h.as_array())
        {
            let docs: Vec<Value> = hits
                .iter()
                .map(|hit| hit.get("_source").cloned().unwrap_or_else(|| hit.clone()))
                .collect();
            return Self::docs_to_table(&docs, started);
        }

        Self::docs_to_table(std::slice::from_ref(&json), started)
    }
}

#[async_trait]
impl DataSourceConnection for HttpConnection {
    fn kind(&self) -> DataSourceKind {
        self.kind
    }

    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    async fn is_valid(&self) -> bool {
        // Reachability, not authorization: any answer counts.
        let mut request = self.client.get(self.base_url.clone());
        if let Some(header) = &self.auth_header {
            request = request.header(AUTHORIZATION, header.clone());
        }
        request.send().await.is_ok()
    }

    async fn execute_query(&self, template: &str, params: &ParamMap, _limit: i64) -> QueryResult {
        let rendered = render(template, params);
        let started = Instant::now();

        let (method, path, body) = match Self::parse_request(&rendered) {
            Ok(parts) => parts,
            Err(e) => return QueryResult::failure(e.to_string(), started),
        };

        match self.send(method, &path, body).await {
            Ok((status, text)) if status.is_success() => Self::tabularize(&text, started),
            Ok((status, text)) => {
                QueryResult::failure(format!("HTTP {}: {}", status.as_u16(), text), started)
            }
            Err(e) => QueryResult::failure(e.to_string(), started),
        }
    }

    async fn execute_update(&self, template: &str, params: &ParamMap) -> UpdateResult {
        let rendered = render(template, params);
        let started = Instant::now();

        let (method, path, body) = match Self::parse_request(&rendered) {
            Ok(parts) => parts,
            Err(e) => return UpdateResult::failure(e.to_string(), started),
        };
        if method == Method::GET {
            return UpdateResult::failure("GET cannot be used as an update", started);
        }

        match self.send(method, &path, body).await {
            Ok((status, _)) if status.is_success() => UpdateResult::success(1, started),
            Ok((status, text)) => {
                UpdateResult::failure(format!("HTTP {}: {}", status.as_u16(), text), started)
            }
            Err(e) => UpdateResult::failure(e.to_string(), started),
        }
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.info.clone()
    }

    async fn list_tables(&self) -> Result<Vec<String>, CoreError> {
        if self.kind != DataSourceKind::Elasticsearch {
            // Generic HTTP APIs expose no catalog.
            return Ok(Vec::new());
        }

        let (status, text) = self
            .send(Method::GET, "_cat/indices?format=json", None)
            .await?;
        if !status.is_success() {
            return Err(CoreError::Execution(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let indices: Vec<Value> =
            serde_json::from_str(&text).map_err(|e| CoreError::Execution(e.to_string()))?;
        Ok(indices
            .iter()
            .filter_map(|item| item.get("index").and_then(|v| v.as_str()))
            .map(String::from)
            .collect())
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema, CoreError> {
        if self.kind != DataSourceKind::Elasticsearch {
            return Ok(TableSchema {
                table: table.to_string(),
                columns: Vec::new(),
            });
        }

        let (status, text) = self
            .send(Method::GET, &format!("{}/_mapping", table), None)
            .await?;
        if !status.is_success() {
            return Err(CoreError::Execution(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let mapping: Value =
            serde_json::from_str(&text).map_err(|e| CoreError::Execution(e.to_string()))?;
        let properties = mapping
            .as_object()
            .and_then(|m| m.values().next())
            .and_then(|index| index.get("mappings"))
            .and_then(|m| m.get("properties"))
            .and_then(|p| p.as_object());

        let columns = properties
            .map(|props| {
                props
                    .iter()
                    .map(|(name, spec)| ColumnInfo {
                        name: name.clone(),
                        data_type: spec
                            .get("type")
                            .and_then(|t| t.as_str())
                            .unwrap_or("object")
                            .to_string(),
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
        // Stateless; nothing held open.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_method_path_and_body() {
        let (method, path, body) =
            HttpConnection::parse_request("POST /logs/_search {\"size\": 10}").unwrap();
        assert_eq!(method, Method::POST);
        assert_eq!(path, "/logs/_search");
        assert_eq!(body, Some(json!({"size": 10})));

        let (method, path, body) = HttpConnection::parse_request("GET /users").unwrap();
        assert_eq!(method, Method::GET);
        assert_eq!(path, "/users");
        assert!(body.is_none());
    }

    #[test]
    fn rejects_other_verbs_and_garbage() {
        assert!(HttpConnection::parse_request("DELETE /users/1").is_err());
        assert!(HttpConnection::parse_request("GET").is_err());
        assert!(HttpConnection::parse_request("POST /x not-json").is_err());
    }

    #[test]
    fn json_array_response_becomes_rows() {
        let body = r#"[{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]"#;
        let result = HttpConnection::tabularize(body, Instant::now());
        assert!(result.ok);
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.row_count, 2);
    }

    #[test]
    fn search_hits_contribute_sources() {
        let body = r#"{
            "hits": {"hits": [
                {"_id": "1", "_source": {"level": "warn", "msg": "slow"}},
                {"_id": "2", "_source": {"level": "error", "msg": "down"}}
            ]}
        }"#;
        let result = HttpConnection::tabularize(body, Instant::now());
        assert!(result.ok);
        assert_eq!(result.columns, vec!["level", "msg"]);
        assert_eq!(result.rows[1][0], Value::String("error".into()));
    }

    #[test]
    fn plain_object_is_a_single_row() {
        let result = HttpConnection::tabularize(r#"{"status": "green"}"#, Instant::now());
        assert_eq!(result.row_count, 1);
        assert_eq!(result.columns, vec!["status"]);
    }
}
