use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ApiServiceStore, AuditStore, DataSourceStore, Page};
use crate::error::CoreError;
use crate::models::{
    ApiServiceDraft, ApiServiceVersion, AuditRecord, DataSourceConfig, TableSelection,
};

/// In-memory `DataSourceStore` for tests and lightweight embedders.
#[derive(Default)]
pub struct InMemoryDataSourceStore {
    rows: Arc<RwLock<HashMap<Uuid, DataSourceConfig>>>,
}

impl InMemoryDataSourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataSourceStore for InMemoryDataSourceStore {
    async fn get(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<DataSourceConfig>, CoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&id)
            .filter(|c| c.meta.tenant_id == tenant_id)
            .cloned())
    }

    async fn save(&self, config: DataSourceConfig) -> Result<(), CoreError> {
        self.rows.write().await.insert(config.meta.id, config);
        Ok(())
    }

    async fn disable(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        updated_by: Uuid,
    ) -> Result<bool, CoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id).filter(|c| c.meta.tenant_id == tenant_id) {
            Some(config) => {
                config.enabled = false;
                config.meta.touch(updated_by);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        page: Page,
    ) -> Result<Vec<DataSourceConfig>, CoreError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<DataSourceConfig> = rows
            .values()
            .filter(|c| c.meta.tenant_id == tenant_id)
            .cloned()
            .collect();
        matching.sort_by_key(|c| c.meta.created_at);
        Ok(matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }
}

#[derive(Default)]
struct ServiceRows {
    drafts: HashMap<Uuid, ApiServiceDraft>,
    versions: HashMap<Uuid, Vec<ApiServiceVersion>>,
    selections: HashMap<Uuid, Vec<TableSelection>>,
}

/// In-memory `ApiServiceStore`. All version mutations happen under one write
/// lock, which is what makes `set_active_exclusive` atomic here.
#[derive(Default)]
pub struct InMemoryApiServiceStore {
    rows: Arc<RwLock<ServiceRows>>,
}

impl InMemoryApiServiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiServiceStore for InMemoryApiServiceStore {
    async fn get_draft(
        &self,
        tenant_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<ApiServiceDraft>, CoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .drafts
            .get(&service_id)
            .filter(|d| d.meta.tenant_id == tenant_id)
            .cloned())
    }

    async fn save_draft(&self, draft: ApiServiceDraft) -> Result<(), CoreError> {
        self.rows.write().await.drafts.insert(draft.meta.id, draft);
        Ok(())
    }

    async fn delete_draft(&self, tenant_id: Uuid, service_id: Uuid) -> Result<bool, CoreError> {
        let mut rows = self.rows.write().await;
        let owned = rows
            .drafts
            .get(&service_id)
            .map(|d| d.meta.tenant_id == tenant_id)
            .unwrap_or(false);
        if owned {
            rows.drafts.remove(&service_id);
            // Table selections share the draft's lifetime.
            rows.selections.remove(&service_id);
        }
        Ok(owned)
    }

    async fn list_drafts(
        &self,
        tenant_id: Uuid,
        page: Page,
    ) -> Result<Vec<ApiServiceDraft>, CoreError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<ApiServiceDraft> = rows
            .drafts
            .values()
            .filter(|d| d.meta.tenant_id == tenant_id)
            .cloned()
            .collect();
        matching.sort_by_key(|d| d.meta.created_at);
        Ok(matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn insert_version(&self, version: ApiServiceVersion) -> Result<(), CoreError> {
        let mut rows = self.rows.write().await;
        let versions = rows.versions.entry(version.service_id).or_default();
        if versions.iter().any(|v| v.label == version.label) {
            return Err(CoreError::DuplicateVersionLabel {
                label: version.label,
            });
        }
        versions.push(version);
        Ok(())
    }

    async fn replace_version(&self, version: ApiServiceVersion) -> Result<(), CoreError> {
        let mut rows = self.rows.write().await;
        let versions = rows.versions.entry(version.service_id).or_default();
        versions.retain(|v| v.label != version.label);
        versions.push(version);
        Ok(())
    }

    async fn find_version(
        &self,
        service_id: Uuid,
        label: &str,
    ) -> Result<Option<ApiServiceVersion>, CoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .versions
            .get(&service_id)
            .and_then(|versions| versions.iter().find(|v| v.label == label))
            .cloned())
    }

    async fn active_version(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ApiServiceVersion>, CoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .versions
            .get(&service_id)
            .and_then(|versions| versions.iter().find(|v| v.active))
            .cloned())
    }

    async fn list_versions(
        &self,
        service_id: Uuid,
        page: Page,
    ) -> Result<Vec<ApiServiceVersion>, CoreError> {
        let rows = self.rows.read().await;
        let mut versions = rows.versions.get(&service_id).cloned().unwrap_or_default();
        versions.sort_by_key(|v| v.published_at);
        Ok(versions
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn set_active_exclusive(
        &self,
        service_id: Uuid,
        version_id: Uuid,
    ) -> Result<(), CoreError> {
        let mut rows = self.rows.write().await;
        let versions = rows
            .versions
            .get_mut(&service_id)
            .ok_or_else(|| CoreError::NotFound(format!("service {}", service_id)))?;
        if !versions.iter().any(|v| v.id == version_id) {
            return Err(CoreError::NotFound(format!("version {}", version_id)));
        }
        // One critical section flips the target on and every sibling off.
        for version in versions.iter_mut() {
            version.active = version.id == version_id;
        }
        Ok(())
    }

    async fn clear_active(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ApiServiceVersion>, CoreError> {
        let mut rows = self.rows.write().await;
        let Some(versions) = rows.versions.get_mut(&service_id) else {
            return Ok(None);
        };
        for version in versions.iter_mut() {
            if version.active {
                version.active = false;
                version.unpublished_at = Some(Utc::now());
                return Ok(Some(version.clone()));
            }
        }
        Ok(None)
    }

    async fn table_selections(
        &self,
        service_id: Uuid,
    ) -> Result<Vec<TableSelection>, CoreError> {
        let rows = self.rows.read().await;
        Ok(rows.selections.get(&service_id).cloned().unwrap_or_default())
    }

    async fn save_table_selections(
        &self,
        service_id: Uuid,
        selections: Vec<TableSelection>,
    ) -> Result<(), CoreError> {
        self.rows
            .write()
            .await
            .selections
            .insert(service_id, selections);
        Ok(())
    }
}

/// In-memory append-only `AuditStore`.
#[derive(Default)]
pub struct InMemoryAuditStore {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<(), CoreError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list_for_service(
        &self,
        service_id: Uuid,
        page: Page,
    ) -> Result<Vec<AuditRecord>, CoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.service_id == Some(service_id))
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.recorded_at >= cutoff);
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::models::{
        AuditedRecord, DataSourceKind, HttpMethod, OperationKind, Outcome, PoolSizing,
        ServiceStatus,
    };
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn draft(owner: Uuid, tenant: Uuid) -> ApiServiceDraft {
        ApiServiceDraft {
            meta: AuditedRecord::new(owner, tenant),
            name: "svc".into(),
            path: "/svc".into(),
            method: HttpMethod::Get,
            data_source_id: Uuid::new_v4(),
            query_template: "SELECT 1".into(),
            parameters: Vec::new(),
            response_example: None,
            cache_policy: None,
            rate_limit: None,
            status: ServiceStatus::Draft,
        }
    }

    #[tokio::test]
    async fn data_source_soft_delete_keeps_the_row() {
        let store = InMemoryDataSourceStore::new();
        let tenant = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let config = DataSourceConfig {
            meta: AuditedRecord::new(owner, tenant),
            name: "db".into(),
            kind: DataSourceKind::Postgres,
            host: "db".into(),
            port: 5432,
            database: Some("app".into()),
            username: Some("svc".into()),
            password: None,
            use_tls: false,
            pool: PoolSizing::default(),
            properties: BTreeMap::new(),
            enabled: true,
        };
        let id = config.meta.id;
        store.save(config).await.unwrap();

        assert!(store.disable(tenant, id, owner).await.unwrap());
        let row = store.get(tenant, id).await.unwrap().unwrap();
        assert!(!row.enabled);

        // Another tenant can neither see nor disable it.
        let other = Uuid::new_v4();
        assert!(store.get(other, id).await.unwrap().is_none());
        assert!(!store.disable(other, id, owner).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_labels_are_rejected_and_replace_supersedes() {
        let store = InMemoryApiServiceStore::new();
        let owner = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let d = draft(owner, tenant);
        let service_id = d.meta.id;
        store.save_draft(d.clone()).await.unwrap();

        let v1 = d.snapshot("v1", owner);
        store.insert_version(v1.clone()).await.unwrap();

        let dup = d.snapshot("v1", owner);
        let err = store.insert_version(dup).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateVersionLabel { .. }));

        let replacement = d.snapshot("v1", owner);
        let replacement_id = replacement.id;
        store.replace_version(replacement).await.unwrap();
        let found = store.find_version(service_id, "v1").await.unwrap().unwrap();
        assert_eq!(found.id, replacement_id);
    }

    #[tokio::test]
    async fn set_active_exclusive_leaves_exactly_one_active() {
        let store = Arc::new(InMemoryApiServiceStore::new());
        let owner = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let d = draft(owner, tenant);
        let service_id = d.meta.id;
        store.save_draft(d.clone()).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..10 {
            let mut v = d.snapshot(&format!("v{}", i), owner);
            v.active = false;
            ids.push(v.id);
            store.insert_version(v).await.unwrap();
        }

        let mut handles = Vec::new();
        for id in ids {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.set_active_exclusive(service_id, id).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let versions = store
            .list_versions(service_id, Page::new(0, 100))
            .await
            .unwrap();
        assert_eq!(versions.iter().filter(|v| v.active).count(), 1);
    }

    #[tokio::test]
    async fn clear_active_stamps_unpublished_at() {
        let store = InMemoryApiServiceStore::new();
        let owner = Uuid::new_v4();
        let d = draft(owner, Uuid::new_v4());
        let service_id = d.meta.id;
        store.save_draft(d.clone()).await.unwrap();

        let v = d.snapshot("v1", owner);
        let vid = v.id;
        store.insert_version(v).await.unwrap();
        store.set_active_exclusive(service_id, vid).await.unwrap();

        let cleared = store.clear_active(service_id).await.unwrap().unwrap();
        assert!(!cleared.active);
        assert!(cleared.unpublished_at.is_some());
        assert!(store.active_version(service_id).await.unwrap().is_none());
        assert!(store.clear_active(service_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_draft_removes_its_selections() {
        let store = InMemoryApiServiceStore::new();
        let owner = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let d = draft(owner, tenant);
        let service_id = d.meta.id;
        store.save_draft(d).await.unwrap();
        store
            .save_table_selections(
                service_id,
                vec![TableSelection {
                    id: Uuid::new_v4(),
                    service_id,
                    table_name: "users".into(),
                    columns: vec!["id".into()],
                    primary: true,
                    join_type: None,
                    join_condition: None,
                    position: 0,
                }],
            )
            .await
            .unwrap();

        assert!(store.delete_draft(tenant, service_id).await.unwrap());
        assert!(store.table_selections(service_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn purge_removes_only_old_records() {
        let store = InMemoryAuditStore::new();
        let ctx = RequestContext::new(Uuid::new_v4(), Uuid::new_v4());

        let mut old = AuditRecord::new(&ctx, OperationKind::Test, Outcome::Success);
        old.recorded_at = Utc::now() - Duration::days(120);
        store.append(old).await.unwrap();
        store
            .append(AuditRecord::new(&ctx, OperationKind::Test, Outcome::Success))
            .await
            .unwrap();

        let purged = store
            .purge_older_than(Utc::now() - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.len().await, 1);
    }
}
