use thiserror::Error;

/// Core error taxonomy for configuration, connection, query, and lifecycle
/// failures.
///
/// Test and execute operations recover every variant at the operation boundary
/// into a structured outcome; only contract violations (poisoned state, absent
/// wiring) are allowed to panic.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Client library for {kind} is not available (add crate {coordinate})")]
    DependencyUnavailable { kind: String, coordinate: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query rejected: {0}")]
    QueryRejected(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Version '{label}' not found")]
    VersionNotFound { label: String },

    #[error("Version label '{label}' already exists for this service")]
    DuplicateVersionLabel { label: String },

    #[error("Service has no active version")]
    NoActiveVersion,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Connector for {kind} is not implemented (would require crate {coordinate})")]
    NotImplemented { kind: String, coordinate: String },

    #[error("Connection pool exhausted after {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Whether the caller may reasonably retry the operation.
    ///
    /// Configuration and dependency problems never go away on retry; network
    /// and pool pressure might.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Connection(_) | CoreError::PoolExhausted { .. } | CoreError::Execution(_)
        )
    }
}
