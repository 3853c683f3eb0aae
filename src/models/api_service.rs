use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audited::AuditedRecord;

/// HTTP verb an API service is exposed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        };
        f.write_str(verb)
    }
}

/// Lifecycle state of a service definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Draft,
    Published,
}

/// Declared type of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    List,
}

/// One entry of a service's declared parameter schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Response caching policy attached to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub ttl_secs: u64,
}

/// Rate limit attached to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u32,
    pub per_secs: u32,
}

/// The mutable working definition of an API service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiServiceDraft {
    pub meta: AuditedRecord,
    pub name: String,
    pub path: String,
    pub method: HttpMethod,
    pub data_source_id: Uuid,
    pub query_template: String,
    pub parameters: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_policy: Option<CachePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    pub status: ServiceStatus,
}

impl ApiServiceDraft {
    /// Freeze the draft into an immutable version snapshot.
    pub fn snapshot(&self, label: &str, published_by: Uuid) -> ApiServiceVersion {
        ApiServiceVersion {
            id: Uuid::new_v4(),
            service_id: self.meta.id,
            tenant_id: self.meta.tenant_id,
            label: label.to_string(),
            name: self.name.clone(),
            path: self.path.clone(),
            method: self.method,
            data_source_id: self.data_source_id,
            query_template: self.query_template.clone(),
            parameters: self.parameters.clone(),
            response_example: self.response_example.clone(),
            cache_policy: self.cache_policy,
            rate_limit: self.rate_limit,
            active: true,
            published_at: Utc::now(),
            published_by,
            unpublished_at: None,
        }
    }
}

/// Immutable snapshot of a draft, taken at publish time.
///
/// Invariants upheld by the store: labels are unique per service and at most
/// one version per service is `active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiServiceVersion {
    pub id: Uuid,
    pub service_id: Uuid,
    pub tenant_id: Uuid,
    pub label: String,
    pub name: String,
    pub path: String,
    pub method: HttpMethod,
    pub data_source_id: Uuid,
    pub query_template: String,
    pub parameters: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_policy: Option<CachePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    pub active: bool,
    pub published_at: DateTime<Utc>,
    pub published_by: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpublished_at: Option<DateTime<Utc>>,
}

/// Join strategy for a non-primary table selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sql = match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
        };
        f.write_str(sql)
    }
}

/// A table/column pick a draft references; an ordered set of these seeds the
/// starter query template. Deleted together with the owning draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSelection {
    pub id: Uuid,
    pub service_id: Uuid,
    pub table_name: String,
    pub columns: Vec<String>,
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_type: Option<JoinType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_condition: Option<String>,
    pub position: u32,
}
