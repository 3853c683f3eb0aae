pub mod api_service;
pub mod audit;
pub mod audited;
pub mod data_source;

pub use api_service::{
    ApiServiceDraft, ApiServiceVersion, CachePolicy, HttpMethod, JoinType, ParameterKind,
    ParameterSpec, RateLimit, ServiceStatus, TableSelection,
};
pub use audit::{AuditRecord, OperationKind, Outcome};
pub use audited::AuditedRecord;
pub use data_source::{
    DataSourceCategory, DataSourceConfig, DataSourceKind, PoolSizing, ProtocolFamily,
};
