//! Persistence contracts consumed by the core.
//!
//! Storage technology lives outside this crate; embedders implement these
//! traits over their database of choice. The in-memory implementations in
//! [`memory`] back tests and lightweight embedders.
//!
//! Invariants any implementation must uphold: version labels are unique per
//! service, at most one version per service is active (`set_active_exclusive`
//! flips the rest off in the same atomic step), and data sources referenced
//! by published services are soft-deleted (`enabled = false`), never removed.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    ApiServiceDraft, ApiServiceVersion, AuditRecord, DataSourceConfig, TableSelection,
};

/// Offset/limit pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

#[async_trait]
pub trait DataSourceStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<DataSourceConfig>, CoreError>;

    async fn save(&self, config: DataSourceConfig) -> Result<(), CoreError>;

    /// Soft delete: flip `enabled` off, keep the row. Returns whether the
    /// data source existed.
    async fn disable(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        updated_by: Uuid,
    ) -> Result<bool, CoreError>;

    async fn list(
        &self,
        tenant_id: Uuid,
        page: Page,
    ) -> Result<Vec<DataSourceConfig>, CoreError>;
}

#[async_trait]
pub trait ApiServiceStore: Send + Sync {
    async fn get_draft(
        &self,
        tenant_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<ApiServiceDraft>, CoreError>;

    async fn save_draft(&self, draft: ApiServiceDraft) -> Result<(), CoreError>;

    /// Remove a draft together with its table selections.
    async fn delete_draft(&self, tenant_id: Uuid, service_id: Uuid) -> Result<bool, CoreError>;

    async fn list_drafts(
        &self,
        tenant_id: Uuid,
        page: Page,
    ) -> Result<Vec<ApiServiceDraft>, CoreError>;

    /// Insert a new snapshot; fails with `DuplicateVersionLabel` when the
    /// label is taken for this service.
    async fn insert_version(&self, version: ApiServiceVersion) -> Result<(), CoreError>;

    /// Replace the snapshot carrying the same label (force publish).
    async fn replace_version(&self, version: ApiServiceVersion) -> Result<(), CoreError>;

    async fn find_version(
        &self,
        service_id: Uuid,
        label: &str,
    ) -> Result<Option<ApiServiceVersion>, CoreError>;

    async fn active_version(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ApiServiceVersion>, CoreError>;

    async fn list_versions(
        &self,
        service_id: Uuid,
        page: Page,
    ) -> Result<Vec<ApiServiceVersion>, CoreError>;

    /// Atomically mark `version_id` active and every sibling inactive; two
    /// concurrent publishes must never leave two active versions.
    async fn set_active_exclusive(
        &self,
        service_id: Uuid,
        version_id: Uuid,
    ) -> Result<(), CoreError>;

    /// Deactivate the active version, stamping `unpublished_at`. Returns the
    /// updated version, or `None` when none was active.
    async fn clear_active(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ApiServiceVersion>, CoreError>;

    async fn table_selections(
        &self,
        service_id: Uuid,
    ) -> Result<Vec<TableSelection>, CoreError>;

    async fn save_table_selections(
        &self,
        service_id: Uuid,
        selections: Vec<TableSelection>,
    ) -> Result<(), CoreError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), CoreError>;

    async fn list_for_service(
        &self,
        service_id: Uuid,
        page: Page,
    ) -> Result<Vec<AuditRecord>, CoreError>;

    /// Drop records older than the cutoff; returns how many were removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CoreError>;
}
