use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::compare::{compare_versions, VersionDiff};
use crate::audit::AuditRecorder;
use crate::config::CoreConfig;
use crate::context::RequestContext;
use crate::datasource::connector::elapsed_ms;
use crate::datasource::{ConnectionManager, ParamMap, QueryResult};
use crate::error::CoreError;
use crate::models::{
    ApiServiceVersion, AuditRecord, DataSourceConfig, OperationKind, Outcome, ServiceStatus,
};
use crate::store::{ApiServiceStore, DataSourceStore};
use crate::template;

/// Which query text a test run resolves.
#[derive(Debug, Clone)]
pub enum TestTarget {
    /// The live draft (owner only).
    Draft,
    /// The currently active published version.
    Active,
    /// A specific published version by label.
    Version(String),
}

/// Structured outcome of a test or execute call. Always returned — including
/// on failure — so latency and failure cause stay observable.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    pub elapsed_ms: u64,
}

impl TestOutcome {
    fn from_error(error: &CoreError, started: Instant) -> Self {
        Self {
            success: false,
            message: Some(error.to_string()),
            rendered_query: None,
            result: None,
            elapsed_ms: elapsed_ms(started),
        }
    }
}

/// Draft → published state machine plus test execution, wired to the
/// federation core. Every operation takes an explicit `RequestContext` and is
/// audited.
pub struct ServiceLifecycle {
    data_sources: Arc<dyn DataSourceStore>,
    services: Arc<dyn ApiServiceStore>,
    connections: Arc<ConnectionManager>,
    audit: Arc<dyn AuditRecorder>,
    config: CoreConfig,
}

impl ServiceLifecycle {
    pub fn new(
        data_sources: Arc<dyn DataSourceStore>,
        services: Arc<dyn ApiServiceStore>,
        connections: Arc<ConnectionManager>,
        audit: Arc<dyn AuditRecorder>,
        config: CoreConfig,
    ) -> Self {
        Self {
            data_sources,
            services,
            connections,
            audit,
            config,
        }
    }

    /// Snapshot the draft as an immutable version and make it the active one.
    ///
    /// Requires a valid query template and an unused label; `force` replaces
    /// the same-label snapshot instead of failing.
    pub async fn publish(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        label: &str,
        force: bool,
    ) -> Result<ApiServiceVersion, CoreError> {
        let started = Instant::now();
        let previous = self.services.active_version(service_id).await.ok().flatten();
        let result = self.publish_inner(ctx, service_id, label, force).await;

        let record = match &result {
            Ok(version) => AuditRecord::new(ctx, OperationKind::Publish, Outcome::Success)
                .service(service_id)
                .before(json!({ "active_label": previous.map(|v| v.label) }))
                .after(json!({ "label": version.label, "version_id": version.id })),
            Err(e) => AuditRecord::new(ctx, OperationKind::Publish, Outcome::Failure)
                .service(service_id)
                .error_text(e.to_string()),
        };
        self.audit.record(record.elapsed_ms(elapsed_ms(started))).await;

        result
    }

    async fn publish_inner(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        label: &str,
        force: bool,
    ) -> Result<ApiServiceVersion, CoreError> {
        let mut draft = self
            .services
            .get_draft(ctx.tenant_id, service_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("service {}", service_id)))?;
        if !ctx.is_owner(draft.meta.created_by) {
            return Err(CoreError::PermissionDenied);
        }

        let data_source = self.data_source(ctx, draft.data_source_id).await?;
        template::validate_query(&draft.query_template, data_source.kind.category())?;

        let label_taken = self.services.find_version(service_id, label).await?.is_some();
        if label_taken && !force {
            return Err(CoreError::DuplicateVersionLabel {
                label: label.to_string(),
            });
        }

        let version = draft.snapshot(label, ctx.user_id);
        if label_taken {
            self.services.replace_version(version.clone()).await?;
        } else {
            self.services.insert_version(version.clone()).await?;
        }
        self.services
            .set_active_exclusive(service_id, version.id)
            .await?;

        draft.status = ServiceStatus::Published;
        draft.meta.touch(ctx.user_id);
        self.services.save_draft(draft).await?;

        info!("Published service {} as '{}'", service_id, label);
        Ok(version)
    }

    /// Deactivate the active version; the draft returns to DRAFT for edits.
    pub async fn unpublish(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
    ) -> Result<ApiServiceVersion, CoreError> {
        let started = Instant::now();
        let result = self.unpublish_inner(ctx, service_id).await;

        let record = match &result {
            Ok(version) => AuditRecord::new(ctx, OperationKind::Unpublish, Outcome::Success)
                .service(service_id)
                .before(json!({ "active_label": version.label })),
            Err(e) => AuditRecord::new(ctx, OperationKind::Unpublish, Outcome::Failure)
                .service(service_id)
                .error_text(e.to_string()),
        };
        self.audit.record(record.elapsed_ms(elapsed_ms(started))).await;

        result
    }

    async fn unpublish_inner(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
    ) -> Result<ApiServiceVersion, CoreError> {
        let mut draft = self
            .services
            .get_draft(ctx.tenant_id, service_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("service {}", service_id)))?;
        if !ctx.is_owner(draft.meta.created_by) {
            return Err(CoreError::PermissionDenied);
        }

        let cleared = self
            .services
            .clear_active(service_id)
            .await?
            .ok_or(CoreError::NoActiveVersion)?;

        draft.status = ServiceStatus::Draft;
        draft.meta.touch(ctx.user_id);
        self.services.save_draft(draft).await?;

        info!("Unpublished service {} ('{}')", service_id, cleared.label);
        Ok(cleared)
    }

    /// Run the live draft's query. Only the draft's owner may do this.
    pub async fn test_draft(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        params: &ParamMap,
    ) -> TestOutcome {
        let outcome = self
            .run_target(ctx, service_id, &TestTarget::Draft, params)
            .await;
        self.audit_test(ctx, service_id, &outcome).await;
        outcome
    }

    /// Run a published version's query: the named version if given, else the
    /// active one.
    pub async fn test_published(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        version_label: Option<&str>,
        params: &ParamMap,
    ) -> TestOutcome {
        let target = match version_label {
            Some(label) => TestTarget::Version(label.to_string()),
            None => TestTarget::Active,
        };
        let outcome = self.run_target(ctx, service_id, &target, params).await;
        self.audit_test(ctx, service_id, &outcome).await;
        outcome
    }

    /// Run every parameter set against the same target. Results come back in
    /// input order; one item failing never aborts the rest.
    pub async fn batch_test(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        target: TestTarget,
        param_sets: Vec<ParamMap>,
    ) -> Vec<TestOutcome> {
        let started = Instant::now();
        let ctx = *ctx;
        let total = param_sets.len();

        let outcomes: Vec<TestOutcome> = stream::iter(param_sets)
            .map(|params| {
                let target = target.clone();
                async move { self.run_target(&ctx, service_id, &target, &params).await }
            })
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        let failures = outcomes.iter().filter(|o| !o.success).count();
        let outcome_kind = if failures == 0 {
            Outcome::Success
        } else if failures == total && total > 0 {
            Outcome::Failure
        } else {
            Outcome::Partial
        };
        self.audit
            .record(
                AuditRecord::new(&ctx, OperationKind::Test, outcome_kind)
                    .service(service_id)
                    .after(json!({ "items": total, "failures": failures }))
                    .elapsed_ms(elapsed_ms(started)),
            )
            .await;

        outcomes
    }

    /// Field-by-field diff between two published versions.
    pub async fn compare_versions(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        left_label: &str,
        right_label: &str,
    ) -> Result<VersionDiff, CoreError> {
        let started = Instant::now();
        let result = self
            .compare_inner(ctx, service_id, left_label, right_label)
            .await;

        let record = match &result {
            Ok(diff) => AuditRecord::new(ctx, OperationKind::VersionCompare, Outcome::Success)
                .service(service_id)
                .after(json!({
                    "left": left_label,
                    "right": right_label,
                    "changed_fields": diff.changed_count(),
                })),
            Err(e) => AuditRecord::new(ctx, OperationKind::VersionCompare, Outcome::Failure)
                .service(service_id)
                .error_text(e.to_string()),
        };
        self.audit.record(record.elapsed_ms(elapsed_ms(started))).await;

        result
    }

    async fn compare_inner(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        left_label: &str,
        right_label: &str,
    ) -> Result<VersionDiff, CoreError> {
        let left = self.named_version(ctx, service_id, left_label).await?;
        let right = self.named_version(ctx, service_id, right_label).await?;
        Ok(compare_versions(&left, &right))
    }

    /// Build a starter SELECT from the draft's table selections.
    pub async fn derive_starter_template(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
    ) -> Result<String, CoreError> {
        let draft = self
            .services
            .get_draft(ctx.tenant_id, service_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("service {}", service_id)))?;
        if !ctx.is_owner(draft.meta.created_by) {
            return Err(CoreError::PermissionDenied);
        }
        let selections = self.services.table_selections(service_id).await?;
        template::derive_query_template(&selections)
    }

    async fn audit_test(&self, ctx: &RequestContext, service_id: Uuid, outcome: &TestOutcome) {
        let kind = if outcome.success {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        let mut record = AuditRecord::new(ctx, OperationKind::Test, kind)
            .service(service_id)
            .elapsed_ms(outcome.elapsed_ms);
        if let Some(error) = &outcome.message {
            record = record.error_text(error.clone());
        }
        self.audit.record(record).await;
    }

    async fn run_target(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        target: &TestTarget,
        params: &ParamMap,
    ) -> TestOutcome {
        let started = Instant::now();
        match self.try_run(ctx, service_id, target, params).await {
            Ok(outcome) => outcome,
            Err(e) => TestOutcome::from_error(&e, started),
        }
    }

    async fn try_run(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        target: &TestTarget,
        params: &ParamMap,
    ) -> Result<TestOutcome, CoreError> {
        let started = Instant::now();
        let (data_source_id, template_text) =
            self.resolve_target(ctx, service_id, target).await?;

        let data_source = self.data_source(ctx, data_source_id).await?;
        template::validate_query(&template_text, data_source.kind.category())?;

        let connection = self.connections.get(&data_source).await?;
        let rendered = template::render(&template_text, params);
        let result = connection
            .execute_query(&template_text, params, self.config.default_row_limit)
            .await;

        Ok(TestOutcome {
            success: result.ok,
            message: result.error.clone(),
            rendered_query: Some(rendered),
            elapsed_ms: elapsed_ms(started),
            result: Some(result),
        })
    }

    async fn resolve_target(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        target: &TestTarget,
    ) -> Result<(Uuid, String), CoreError> {
        match target {
            TestTarget::Draft => {
                let draft = self
                    .services
                    .get_draft(ctx.tenant_id, service_id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("service {}", service_id)))?;
                if !ctx.is_owner(draft.meta.created_by) {
                    return Err(CoreError::PermissionDenied);
                }
                Ok((draft.data_source_id, draft.query_template))
            }
            TestTarget::Active => {
                let version = self
                    .services
                    .active_version(service_id)
                    .await?
                    .ok_or(CoreError::NoActiveVersion)?;
                if !ctx.same_tenant(version.tenant_id) {
                    return Err(CoreError::PermissionDenied);
                }
                Ok((version.data_source_id, version.query_template))
            }
            TestTarget::Version(label) => {
                let version = self.named_version(ctx, service_id, label).await?;
                Ok((version.data_source_id, version.query_template))
            }
        }
    }

    async fn named_version(
        &self,
        ctx: &RequestContext,
        service_id: Uuid,
        label: &str,
    ) -> Result<ApiServiceVersion, CoreError> {
        let version = self
            .services
            .find_version(service_id, label)
            .await?
            .ok_or_else(|| CoreError::VersionNotFound {
                label: label.to_string(),
            })?;
        if !ctx.same_tenant(version.tenant_id) {
            return Err(CoreError::PermissionDenied);
        }
        Ok(version)
    }

    async fn data_source(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<DataSourceConfig, CoreError> {
        let config = self
            .data_sources
            .get(ctx.tenant_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("data source {}", id)))?;
        if !config.enabled {
            return Err(CoreError::NotFound(format!(
                "data source {} is disabled",
                id
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::StoreAuditRecorder;
    use crate::models::{
        ApiServiceDraft, AuditedRecord, DataSourceKind, HttpMethod, JoinType, PoolSizing,
        TableSelection,
    };
    use crate::store::memory::{
        InMemoryApiServiceStore, InMemoryAuditStore, InMemoryDataSourceStore,
    };
    use crate::store::AuditStore;
    use crate::store::Page;
    use serde_json::{json, Map, Value};
    use std::collections::BTreeMap;

    struct Fixture {
        lifecycle: Arc<ServiceLifecycle>,
        services: Arc<InMemoryApiServiceStore>,
        audit: Arc<InMemoryAuditStore>,
        ctx: RequestContext,
        service_id: Uuid,
    }

    async fn fixture(query_template: &str) -> Fixture {
        let ctx = RequestContext::new(Uuid::new_v4(), Uuid::new_v4());

        let data_sources = Arc::new(InMemoryDataSourceStore::new());
        let data_source = DataSourceConfig {
            meta: AuditedRecord::new(ctx.user_id, ctx.tenant_id),
            name: "scratch".into(),
            kind: DataSourceKind::Sqlite,
            host: String::new(),
            port: 0,
            database: Some(":memory:".into()),
            username: None,
            password: None,
            use_tls: false,
            pool: PoolSizing::default(),
            properties: BTreeMap::new(),
            enabled: true,
        };
        let data_source_id = data_source.meta.id;
        data_sources.save(data_source).await.unwrap();

        let services = Arc::new(InMemoryApiServiceStore::new());
        let draft = ApiServiceDraft {
            meta: AuditedRecord::new(ctx.user_id, ctx.tenant_id),
            name: "numbers".into(),
            path: "/numbers".into(),
            method: HttpMethod::Get,
            data_source_id,
            query_template: query_template.to_string(),
            parameters: Vec::new(),
            response_example: None,
            cache_policy: None,
            rate_limit: None,
            status: ServiceStatus::Draft,
        };
        let service_id = draft.meta.id;
        services.save_draft(draft).await.unwrap();

        let audit = Arc::new(InMemoryAuditStore::new());
        let lifecycle = Arc::new(ServiceLifecycle::new(
            data_sources,
            services.clone(),
            Arc::new(ConnectionManager::new()),
            Arc::new(StoreAuditRecorder::new(audit.clone())),
            CoreConfig::default(),
        ));

        Fixture {
            lifecycle,
            services,
            audit,
            ctx,
            service_id,
        }
    }

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn publish_supersedes_the_previous_active_version() {
        let f = fixture("SELECT 1 AS one").await;

        let v1 = f
            .lifecycle
            .publish(&f.ctx, f.service_id, "v1", false)
            .await
            .unwrap();
        assert!(v1.active);

        let v2 = f
            .lifecycle
            .publish(&f.ctx, f.service_id, "v2", false)
            .await
            .unwrap();
        assert!(v2.active);

        let v1_now = f
            .services
            .find_version(f.service_id, "v1")
            .await
            .unwrap()
            .unwrap();
        assert!(!v1_now.active);
        let active = f
            .services
            .active_version(f.service_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.label, "v2");

        let draft = f
            .services
            .get_draft(f.ctx.tenant_id, f.service_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(draft.status, ServiceStatus::Published);
    }

    #[tokio::test]
    async fn duplicate_label_needs_the_force_flag() {
        let f = fixture("SELECT 1").await;
        f.lifecycle
            .publish(&f.ctx, f.service_id, "v1", false)
            .await
            .unwrap();

        let err = f
            .lifecycle
            .publish(&f.ctx, f.service_id, "v1", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateVersionLabel { .. }));

        let forced = f
            .lifecycle
            .publish(&f.ctx, f.service_id, "v1", true)
            .await
            .unwrap();
        assert!(forced.active);
        let versions = f
            .services
            .list_versions(f.service_id, Page::new(0, 10))
            .await
            .unwrap();
        assert_eq!(versions.iter().filter(|v| v.label == "v1").count(), 1);
    }

    #[tokio::test]
    async fn publish_rejects_destructive_templates_and_foreign_users() {
        let f = fixture("DROP TABLE users").await;
        let err = f
            .lifecycle
            .publish(&f.ctx, f.service_id, "v1", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::QueryRejected(_)));

        let f = fixture("SELECT 1").await;
        let stranger = RequestContext::new(Uuid::new_v4(), f.ctx.tenant_id);
        let err = f
            .lifecycle
            .publish(&stranger, f.service_id, "v1", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied));
    }

    #[tokio::test]
    async fn unpublish_returns_the_draft_to_editing() {
        let f = fixture("SELECT 1").await;
        f.lifecycle
            .publish(&f.ctx, f.service_id, "v1", false)
            .await
            .unwrap();

        let cleared = f.lifecycle.unpublish(&f.ctx, f.service_id).await.unwrap();
        assert_eq!(cleared.label, "v1");
        assert!(cleared.unpublished_at.is_some());

        let draft = f
            .services
            .get_draft(f.ctx.tenant_id, f.service_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(draft.status, ServiceStatus::Draft);

        let err = f.lifecycle.unpublish(&f.ctx, f.service_id).await.unwrap_err();
        assert!(matches!(err, CoreError::NoActiveVersion));
    }

    #[tokio::test]
    async fn test_draft_runs_the_rendered_query() {
        let f = fixture("SELECT ${id} AS id").await;
        let outcome = f
            .lifecycle
            .test_draft(&f.ctx, f.service_id, &params(&[("id", json!(7))]))
            .await;

        assert!(outcome.success, "{:?}", outcome.message);
        assert_eq!(
            outcome.rendered_query.as_deref(),
            Some("SELECT 7 AS id")
        );
        let result = outcome.result.unwrap();
        assert_eq!(result.columns, vec!["id"]);
        assert_eq!(result.rows, vec![vec![json!(7)]]);
    }

    #[tokio::test]
    async fn test_draft_is_owner_only() {
        let f = fixture("SELECT 1").await;
        let stranger = RequestContext::new(Uuid::new_v4(), f.ctx.tenant_id);

        let outcome = f
            .lifecycle
            .test_draft(&stranger, f.service_id, &Map::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.unwrap().contains("Permission denied"));
    }

    #[tokio::test]
    async fn test_published_resolves_named_and_active_versions() {
        let f = fixture("SELECT 41 AS answer").await;
        f.lifecycle
            .publish(&f.ctx, f.service_id, "v1", false)
            .await
            .unwrap();

        let outcome = f
            .lifecycle
            .test_published(&f.ctx, f.service_id, None, &Map::new())
            .await;
        assert!(outcome.success);

        let outcome = f
            .lifecycle
            .test_published(&f.ctx, f.service_id, Some("v1"), &Map::new())
            .await;
        assert!(outcome.success);

        let outcome = f
            .lifecycle
            .test_published(&f.ctx, f.service_id, Some("ghost"), &Map::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn batch_results_keep_input_order_and_isolate_failures() {
        let f = fixture("SELECT ${v} AS v").await;

        let sets = vec![
            params(&[("v", json!(1))]),
            // The unescaped quote breaks the literal: this item fails alone.
            params(&[("v", json!("a'b"))]),
            params(&[("v", json!(3))]),
        ];
        let outcomes = f
            .lifecycle
            .batch_test(&f.ctx, f.service_id, TestTarget::Draft, sets)
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert!(outcomes[2].success);
        assert_eq!(
            outcomes[0].result.as_ref().unwrap().rows,
            vec![vec![json!(1)]]
        );
        assert_eq!(
            outcomes[2].result.as_ref().unwrap().rows,
            vec![vec![json!(3)]]
        );
    }

    #[tokio::test]
    async fn concurrent_publishes_leave_exactly_one_active() {
        let f = fixture("SELECT 1").await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let lifecycle = Arc::clone(&f.lifecycle);
            let ctx = f.ctx;
            let service_id = f.service_id;
            handles.push(tokio::spawn(async move {
                lifecycle
                    .publish(&ctx, service_id, &format!("v{}", i), false)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let versions = f
            .services
            .list_versions(f.service_id, Page::new(0, 100))
            .await
            .unwrap();
        assert_eq!(versions.len(), 8);
        assert_eq!(versions.iter().filter(|v| v.active).count(), 1);
    }

    #[tokio::test]
    async fn compare_flags_only_the_changed_field() {
        let f = fixture("SELECT 1 AS one").await;
        f.lifecycle
            .publish(&f.ctx, f.service_id, "v1", false)
            .await
            .unwrap();

        let mut draft = f
            .services
            .get_draft(f.ctx.tenant_id, f.service_id)
            .await
            .unwrap()
            .unwrap();
        draft.query_template = "SELECT 2 AS one".into();
        f.services.save_draft(draft).await.unwrap();
        f.lifecycle
            .publish(&f.ctx, f.service_id, "v2", false)
            .await
            .unwrap();

        let same = f
            .lifecycle
            .compare_versions(&f.ctx, f.service_id, "v1", "v1")
            .await
            .unwrap();
        assert_eq!(same.changed_count(), 0);

        let diff = f
            .lifecycle
            .compare_versions(&f.ctx, f.service_id, "v1", "v2")
            .await
            .unwrap();
        assert_eq!(diff.changed_count(), 1);
        assert!(diff
            .fields
            .iter()
            .any(|field| field.field == "query_template"
                && field.change == super::super::compare::ChangeKind::Modified));

        let err = f
            .lifecycle
            .compare_versions(&f.ctx, f.service_id, "v1", "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn operations_leave_an_audit_trail() {
        let f = fixture("SELECT 1").await;
        f.lifecycle
            .publish(&f.ctx, f.service_id, "v1", false)
            .await
            .unwrap();
        f.lifecycle.test_draft(&f.ctx, f.service_id, &Map::new()).await;

        assert!(f.audit.len().await >= 2);
        let records = f
            .audit
            .list_for_service(f.service_id, Page::default())
            .await
            .unwrap();
        assert!(records
            .iter()
            .any(|r| matches!(r.operation, OperationKind::Publish)));
        assert!(records
            .iter()
            .any(|r| matches!(r.operation, OperationKind::Test)));
    }

    #[tokio::test]
    async fn starter_template_comes_from_table_selections() {
        let f = fixture("SELECT 1").await;
        f.services
            .save_table_selections(
                f.service_id,
                vec![
                    TableSelection {
                        id: Uuid::new_v4(),
                        service_id: f.service_id,
                        table_name: "orders".into(),
                        columns: vec!["id".into(), "total".into()],
                        primary: true,
                        join_type: None,
                        join_condition: None,
                        position: 0,
                    },
                    TableSelection {
                        id: Uuid::new_v4(),
                        service_id: f.service_id,
                        table_name: "users".into(),
                        columns: vec!["name".into()],
                        primary: false,
                        join_type: Some(JoinType::Left),
                        join_condition: Some("orders.user_id = users.id".into()),
                        position: 1,
                    },
                ],
            )
            .await
            .unwrap();

        let template = f
            .lifecycle
            .derive_starter_template(&f.ctx, f.service_id)
            .await
            .unwrap();
        assert_eq!(
            template,
            "SELECT orders.id, orders.total, users.name FROM orders \
             LEFT JOIN users ON orders.user_id = users.id"
        );
    }
}
