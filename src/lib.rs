// QueryFab Core Library
// Data-source federation, query templating, and API-service version lifecycle

pub mod audit;
pub mod config;
pub mod context;
pub mod datasource;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod store;
pub mod template;

// Re-export commonly used types for convenience
pub use config::CoreConfig;
pub use context::RequestContext;
pub use datasource::{
    ConnectionManager,
    DataSourceConnection,
    QueryResult,
    UpdateResult,
};
pub use error::CoreError;
pub use lifecycle::ServiceLifecycle;

/// Install a global tracing subscriber honoring `RUST_LOG`.
///
/// Binaries and integration tests call this once at startup; the library
/// itself only emits events.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
