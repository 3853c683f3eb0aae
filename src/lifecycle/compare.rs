use serde::Serialize;
use uuid::Uuid;

use crate::models::ApiServiceVersion;

/// Classification of one compared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// One field of a version diff, with both sides rendered as text.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDiff {
    pub field: String,
    pub change: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
}

/// Field-by-field diff between two version snapshots of the same service.
#[derive(Debug, Clone, Serialize)]
pub struct VersionDiff {
    pub service_id: Uuid,
    pub left_label: String,
    pub right_label: String,
    pub fields: Vec<FieldDiff>,
}

impl VersionDiff {
    /// Number of fields that are not `Unchanged`. Two distinct snapshots must
    /// report at least one.
    pub fn changed_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.change != ChangeKind::Unchanged)
            .count()
    }
}

fn required(field: &str, left: String, right: String) -> FieldDiff {
    FieldDiff {
        field: field.to_string(),
        change: if left == right {
            ChangeKind::Unchanged
        } else {
            ChangeKind::Modified
        },
        left: Some(left),
        right: Some(right),
    }
}

fn optional(field: &str, left: Option<String>, right: Option<String>) -> FieldDiff {
    let change = match (&left, &right) {
        (None, None) => ChangeKind::Unchanged,
        (None, Some(_)) => ChangeKind::Added,
        (Some(_), None) => ChangeKind::Removed,
        (Some(l), Some(r)) if l == r => ChangeKind::Unchanged,
        _ => ChangeKind::Modified,
    };
    FieldDiff {
        field: field.to_string(),
        change,
        left,
        right,
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Compare the definition fields of two snapshots. Publication metadata
/// (timestamps, active flag, publisher) is not part of the definition and is
/// not compared.
pub fn compare_versions(left: &ApiServiceVersion, right: &ApiServiceVersion) -> VersionDiff {
    let fields = vec![
        required("name", left.name.clone(), right.name.clone()),
        required("path", left.path.clone(), right.path.clone()),
        required("method", left.method.to_string(), right.method.to_string()),
        required(
            "data_source_id",
            left.data_source_id.to_string(),
            right.data_source_id.to_string(),
        ),
        required(
            "query_template",
            left.query_template.clone(),
            right.query_template.clone(),
        ),
        required(
            "parameters",
            to_json(&left.parameters),
            to_json(&right.parameters),
        ),
        optional(
            "response_example",
            left.response_example.clone(),
            right.response_example.clone(),
        ),
        optional(
            "cache_policy",
            left.cache_policy.as_ref().map(to_json),
            right.cache_policy.as_ref().map(to_json),
        ),
        optional(
            "rate_limit",
            left.rate_limit.as_ref().map(to_json),
            right.rate_limit.as_ref().map(to_json),
        ),
    ];

    VersionDiff {
        service_id: left.service_id,
        left_label: left.label.clone(),
        right_label: right.label.clone(),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApiServiceDraft, AuditedRecord, CachePolicy, HttpMethod, ServiceStatus,
    };

    fn version(label: &str) -> ApiServiceVersion {
        let draft = ApiServiceDraft {
            meta: AuditedRecord::new(Uuid::new_v4(), Uuid::new_v4()),
            name: "orders".into(),
            path: "/orders".into(),
            method: HttpMethod::Get,
            data_source_id: Uuid::nil(),
            query_template: "SELECT * FROM orders WHERE id = ${id}".into(),
            parameters: Vec::new(),
            response_example: None,
            cache_policy: None,
            rate_limit: None,
            status: ServiceStatus::Draft,
        };
        let mut v = draft.snapshot(label, Uuid::new_v4());
        // Pin the identity fields the diff keys on.
        v.service_id = Uuid::nil();
        v
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let left = version("v1");
        let mut right = version("v2");
        right.service_id = left.service_id;

        let diff = compare_versions(&left, &right);
        assert_eq!(diff.changed_count(), 0);
        assert!(diff
            .fields
            .iter()
            .all(|f| f.change == ChangeKind::Unchanged));
    }

    #[test]
    fn query_change_is_exactly_one_modified_field() {
        let left = version("v1");
        let mut right = version("v2");
        right.query_template = "SELECT * FROM orders WHERE user_id = ${userId}".into();

        let diff = compare_versions(&left, &right);
        assert_eq!(diff.changed_count(), 1);
        let changed: Vec<&FieldDiff> = diff
            .fields
            .iter()
            .filter(|f| f.change != ChangeKind::Unchanged)
            .collect();
        assert_eq!(changed[0].field, "query_template");
        assert_eq!(changed[0].change, ChangeKind::Modified);
    }

    #[test]
    fn optional_fields_classify_as_added_and_removed() {
        let mut left = version("v1");
        let mut right = version("v2");
        right.cache_policy = Some(CachePolicy { ttl_secs: 60 });
        left.response_example = Some("{\"id\": 1}".into());

        let diff = compare_versions(&left, &right);
        let by_name = |name: &str| {
            diff.fields
                .iter()
                .find(|f| f.field == name)
                .map(|f| f.change)
                .unwrap()
        };
        assert_eq!(by_name("cache_policy"), ChangeKind::Added);
        assert_eq!(by_name("response_example"), ChangeKind::Removed);
    }
}
