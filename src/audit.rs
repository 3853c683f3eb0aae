use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::{AuditRecord, Outcome};
use crate::store::AuditStore;

/// Sink for structured audit records. Storage stays external; the core only
/// emits.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Recorder that only logs, for embedders without audit storage.
#[derive(Default)]
pub struct TracingAuditRecorder;

impl TracingAuditRecorder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditRecorder for TracingAuditRecorder {
    async fn record(&self, record: AuditRecord) {
        match record.outcome {
            Outcome::Success => info!(
                operation = ?record.operation,
                service = ?record.service_id,
                actor = %record.actor,
                elapsed_ms = record.elapsed_ms,
                "audit"
            ),
            Outcome::Failure | Outcome::Partial => warn!(
                operation = ?record.operation,
                service = ?record.service_id,
                actor = %record.actor,
                elapsed_ms = record.elapsed_ms,
                error = record.error.as_deref().unwrap_or(""),
                "audit"
            ),
        }
    }
}

/// Recorder that persists through an `AuditStore`.
///
/// A failing store must not fail the operation being audited; persistence
/// errors are logged and swallowed.
pub struct StoreAuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl StoreAuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditRecorder for StoreAuditRecorder {
    async fn record(&self, record: AuditRecord) {
        if let Err(e) = self.store.append(record).await {
            warn!("Failed to persist audit record: {}", e);
        }
    }
}
