use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::RequestContext;

/// Kind of operation an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Publish,
    Unpublish,
    Test,
    VersionCompare,
}

/// How the operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    /// Some items of a batch succeeded, others failed.
    Partial,
}

/// Immutable log entry for a mutating or test operation. Append-only; purged
/// only by retention age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<Uuid>,
    pub operation: OperationKind,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(ctx: &RequestContext, operation: OperationKind, outcome: Outcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id,
            actor: ctx.user_id,
            service_id: None,
            operation,
            outcome,
            before: None,
            after: None,
            error: None,
            elapsed_ms: 0,
            recorded_at: Utc::now(),
        }
    }

    pub fn service(mut self, service_id: Uuid) -> Self {
        self.service_id = Some(service_id);
        self
    }

    pub fn before(mut self, snapshot: Value) -> Self {
        self.before = Some(snapshot);
        self
    }

    pub fn after(mut self, snapshot: Value) -> Self {
        self.after = Some(snapshot);
        self
    }

    pub fn error_text(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_identity_from_context() {
        let ctx = RequestContext::new(Uuid::new_v4(), Uuid::new_v4());
        let service = Uuid::new_v4();

        let record = AuditRecord::new(&ctx, OperationKind::Publish, Outcome::Success)
            .service(service)
            .after(serde_json::json!({"label": "v1"}))
            .elapsed_ms(12);

        assert_eq!(record.actor, ctx.user_id);
        assert_eq!(record.tenant_id, ctx.tenant_id);
        assert_eq!(record.service_id, Some(service));
        assert_eq!(record.elapsed_ms, 12);
        assert!(record.before.is_none());
        assert!(record.error.is_none());
    }
}
