use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shared identity and audit columns embedded by value in persisted entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditedRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditedRecord {
    /// Fresh record owned by the given user and tenant.
    pub fn new(created_by: Uuid, tenant_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            created_by,
            updated_by: created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stamp a mutation.
    pub fn touch(&mut self, updated_by: Uuid) {
        self.updated_by = updated_by;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_updates_stamp_and_actor() {
        let owner = Uuid::new_v4();
        let mut meta = AuditedRecord::new(owner, Uuid::new_v4());
        let created_at = meta.created_at;

        let editor = Uuid::new_v4();
        meta.touch(editor);

        assert_eq!(meta.created_by, owner);
        assert_eq!(meta.updated_by, editor);
        assert_eq!(meta.created_at, created_at);
        assert!(meta.updated_at >= created_at);
    }
}
