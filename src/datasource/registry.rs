use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::Serialize;

use crate::models::{DataSourceCategory, DataSourceKind, ProtocolFamily};

/// The client crate a data-source type needs at runtime.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DependencyInfo {
    pub crate_name: &'static str,
    pub version_req: &'static str,
    /// Cargo feature gating the driver, if it is optional.
    pub feature: Option<&'static str>,
}

impl DependencyInfo {
    /// Human-readable package coordinate for error messages.
    pub fn coordinate(&self) -> String {
        format!("{}@{}", self.crate_name, self.version_req)
    }
}

/// How connections of a type are kept alive between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolingMode {
    /// The driver ships its own pool (sqlx); sizing maps onto it.
    ClientPooled,
    /// Pooled by this crate's bounded pool (driver has none).
    CorePooled,
    /// One shared client reused across requests.
    SharedClient,
    /// Stateless; a connection per request.
    Stateless,
}

/// Per-type wiring, looked up at runtime instead of baked into enum variants.
#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor {
    pub kind: DataSourceKind,
    pub family: ProtocolFamily,
    pub category: DataSourceCategory,
    pub default_port: u16,
    /// Connection URL shape with `{host}`, `{port}`, `{database}` holes.
    /// Credentials are attached separately at open time.
    pub url_template: &'static str,
    pub dependency: DependencyInfo,
    pub pooling: PoolingMode,
}

lazy_static! {
    static ref DESCRIPTORS: HashMap<DataSourceKind, TypeDescriptor> = {
        let entries = [
            TypeDescriptor {
                kind: DataSourceKind::Postgres,
                family: ProtocolFamily::JdbcLike,
                category: DataSourceCategory::Relational,
                default_port: 5432,
                url_template: "postgres://{host}:{port}/{database}",
                dependency: DependencyInfo {
                    crate_name: "sqlx",
                    version_req: "0.8",
                    feature: None,
                },
                pooling: PoolingMode::ClientPooled,
            },
            TypeDescriptor {
                kind: DataSourceKind::MySql,
                family: ProtocolFamily::JdbcLike,
                category: DataSourceCategory::Relational,
                default_port: 3306,
                url_template: "mysql://{host}:{port}/{database}",
                dependency: DependencyInfo {
                    crate_name: "sqlx",
                    version_req: "0.8",
                    feature: None,
                },
                pooling: PoolingMode::ClientPooled,
            },
            TypeDescriptor {
                kind: DataSourceKind::Sqlite,
                family: ProtocolFamily::JdbcLike,
                category: DataSourceCategory::Relational,
                default_port: 0,
                url_template: "sqlite:{database}",
                dependency: DependencyInfo {
                    crate_name: "sqlx",
                    version_req: "0.8",
                    feature: None,
                },
                pooling: PoolingMode::ClientPooled,
            },
            TypeDescriptor {
                kind: DataSourceKind::SqlServer,
                family: ProtocolFamily::JdbcLike,
                category: DataSourceCategory::Relational,
                default_port: 1433,
                url_template: "mssql://{host}:{port}/{database}",
                dependency: DependencyInfo {
                    crate_name: "tiberius",
                    version_req: "0.12",
                    feature: Some("mssql"),
                },
                pooling: PoolingMode::CorePooled,
            },
            TypeDescriptor {
                kind: DataSourceKind::ClickHouse,
                family: ProtocolFamily::Native,
                category: DataSourceCategory::TimeSeries,
                default_port: 8123,
                url_template: "http://{host}:{port}/{database}",
                dependency: DependencyInfo {
                    crate_name: "clickhouse",
                    version_req: "0.12",
                    feature: Some("clickhouse"),
                },
                pooling: PoolingMode::SharedClient,
            },
            TypeDescriptor {
                kind: DataSourceKind::MongoDb,
                family: ProtocolFamily::Native,
                category: DataSourceCategory::Document,
                default_port: 27017,
                url_template: "mongodb://{host}:{port}/{database}",
                dependency: DependencyInfo {
                    crate_name: "mongodb",
                    version_req: "3.1",
                    feature: Some("mongodb"),
                },
                pooling: PoolingMode::SharedClient,
            },
            TypeDescriptor {
                kind: DataSourceKind::Elasticsearch,
                family: ProtocolFamily::Http,
                category: DataSourceCategory::Search,
                default_port: 9200,
                url_template: "http://{host}:{port}",
                dependency: DependencyInfo {
                    crate_name: "reqwest",
                    version_req: "0.12",
                    feature: None,
                },
                pooling: PoolingMode::Stateless,
            },
            TypeDescriptor {
                kind: DataSourceKind::HttpApi,
                family: ProtocolFamily::Http,
                category: DataSourceCategory::HttpApi,
                default_port: 80,
                url_template: "http://{host}:{port}",
                dependency: DependencyInfo {
                    crate_name: "reqwest",
                    version_req: "0.12",
                    feature: None,
                },
                pooling: PoolingMode::Stateless,
            },
            TypeDescriptor {
                kind: DataSourceKind::Neo4j,
                family: ProtocolFamily::Native,
                category: DataSourceCategory::Graph,
                default_port: 7687,
                url_template: "bolt://{host}:{port}",
                dependency: DependencyInfo {
                    crate_name: "neo4rs",
                    version_req: "0.8",
                    feature: None,
                },
                pooling: PoolingMode::SharedClient,
            },
            TypeDescriptor {
                kind: DataSourceKind::Kafka,
                family: ProtocolFamily::Native,
                category: DataSourceCategory::MessageQueue,
                default_port: 9092,
                url_template: "kafka://{host}:{port}",
                dependency: DependencyInfo {
                    crate_name: "rdkafka",
                    version_req: "0.36",
                    feature: None,
                },
                pooling: PoolingMode::SharedClient,
            },
        ];
        entries.into_iter().map(|d| (d.kind, d)).collect()
    };
}

/// Descriptor for a data-source type. Every `DataSourceKind` has one.
pub fn descriptor(kind: DataSourceKind) -> &'static TypeDescriptor {
    DESCRIPTORS
        .get(&kind)
        .unwrap_or_else(|| panic!("missing descriptor for {}", kind))
}

/// Whether the client library for a type is compiled into this build.
pub fn is_dependency_available(kind: DataSourceKind) -> bool {
    match kind {
        DataSourceKind::Postgres | DataSourceKind::MySql | DataSourceKind::Sqlite => true,
        DataSourceKind::SqlServer => cfg!(feature = "mssql"),
        DataSourceKind::ClickHouse => cfg!(feature = "clickhouse"),
        DataSourceKind::MongoDb => cfg!(feature = "mongodb"),
        DataSourceKind::Elasticsearch | DataSourceKind::HttpApi => true,
        DataSourceKind::Neo4j | DataSourceKind::Kafka => false,
    }
}

impl DataSourceKind {
    pub fn family(&self) -> ProtocolFamily {
        descriptor(*self).family
    }

    pub fn category(&self) -> DataSourceCategory {
        descriptor(*self).category
    }

    pub fn default_port(&self) -> u16 {
        descriptor(*self).default_port
    }
}
