pub mod capability;
#[cfg(feature = "clickhouse")]
pub mod clickhouse;
pub mod connector;
pub mod factory;
pub mod http;
pub mod manager;
#[cfg(feature = "mongodb")]
pub mod mongodb;
pub mod mysql;
pub mod pool;
pub mod postgres;
pub mod registry;
pub mod sqlite;
#[cfg(feature = "mssql")]
pub mod sqlserver;

pub use capability::{Capability, MultiDatabase, MultiSchema, QueryValidation, QueryValidator};
pub use connector::{
    ColumnInfo, ConnectionInfo, DataSourceConnection, ParamMap, QueryResult, TableSchema,
    UpdateResult,
};
pub use factory::{
    build_connection_url, create_connection, dependency_info, is_dependency_available,
    test_connection, validate_configuration, ConfigCheck, ConnectionTest,
};
pub use manager::ConnectionManager;
pub use pool::{ConnectionPool, PoolSettings, PoolStatus, PoolableResource, PooledConnection};
pub use registry::{descriptor, DependencyInfo, PoolingMode, TypeDescriptor};
