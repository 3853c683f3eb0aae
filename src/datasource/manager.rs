use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connector::DataSourceConnection;
use super::factory;
use crate::error::CoreError;
use crate::models::{DataSourceConfig, ProtocolFamily};

/// Process-wide cache of live connections, keyed by data-source id plus a
/// hash of the connection-relevant config fields so edits invalidate the
/// cached entry.
///
/// Pooling happens inside each connection (driver pool or this crate's
/// bounded pool); the manager only keeps the shared handle alive between
/// requests. HTTP connections are stateless and never cached.
#[derive(Default)]
pub struct ConnectionManager {
    connections: Arc<RwLock<HashMap<String, Arc<dyn DataSourceConnection>>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shared connection for a data source, opening one if none is
    /// cached or the cached one no longer answers its validity probe.
    pub async fn get(
        &self,
        config: &DataSourceConfig,
    ) -> Result<Arc<dyn DataSourceConnection>, CoreError> {
        if config.kind.family() == ProtocolFamily::Http {
            return Ok(Arc::from(factory::create_connection(config).await?));
        }

        let key = cache_key(config);

        {
            let connections = self.connections.read().await;
            if let Some(connection) = connections.get(&key) {
                if connection.is_valid().await {
                    debug!("Reusing cached connection for data source {}", config.meta.id);
                    return Ok(Arc::clone(connection));
                }
                warn!(
                    "Cached connection for data source {} is invalid, will recreate",
                    config.meta.id
                );
            }
        }

        let mut connections = self.connections.write().await;

        // Another task may have created it while we waited for the lock.
        if let Some(connection) = connections.get(&key) {
            if connection.is_valid().await {
                debug!(
                    "Connection for data source {} was created concurrently",
                    config.meta.id
                );
                return Ok(Arc::clone(connection));
            }
        }

        info!(
            "Opening {} connection for data source {}",
            config.kind, config.meta.id
        );
        let connection: Arc<dyn DataSourceConnection> =
            Arc::from(factory::create_connection(config).await?);
        connections.insert(key, Arc::clone(&connection));
        Ok(connection)
    }

    /// Drop and close the cached connection for a data source (after a config
    /// change or soft delete).
    pub async fn remove(&self, config: &DataSourceConfig) {
        let key = cache_key(config);
        let removed = self.connections.write().await.remove(&key);
        if let Some(connection) = removed {
            connection.close().await;
            info!("Removed cached connection for data source {}", config.meta.id);
        }
    }

    /// Close and forget every cached connection.
    pub async fn clear(&self) {
        let mut connections = self.connections.write().await;
        for (_, connection) in connections.drain() {
            connection.close().await;
        }
    }

    pub async fn cached_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Stable key over the fields that affect how a connection is opened.
fn cache_key(config: &DataSourceConfig) -> String {
    let mut hasher = DefaultHasher::new();
    config.meta.id.hash(&mut hasher);
    config.host.hash(&mut hasher);
    config.port.hash(&mut hasher);
    config.database.hash(&mut hasher);
    config.username.hash(&mut hasher);
    config.use_tls.hash(&mut hasher);
    format!("{}_{:x}", config.meta.id, hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditedRecord, DataSourceKind, PoolSizing};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn config(database: &str) -> DataSourceConfig {
        DataSourceConfig {
            meta: AuditedRecord::new(Uuid::new_v4(), Uuid::new_v4()),
            name: "events".into(),
            kind: DataSourceKind::Sqlite,
            host: String::new(),
            port: 0,
            database: Some(database.to_string()),
            username: None,
            password: None,
            use_tls: false,
            pool: PoolSizing::default(),
            properties: BTreeMap::from([("create_if_missing".to_string(), "true".to_string())]),
            enabled: true,
        }
    }

    #[test]
    fn cache_key_tracks_connection_fields() {
        let a = config(":memory:");
        let mut b = a.clone();
        assert_eq!(cache_key(&a), cache_key(&b));

        b.database = Some("other.db".into());
        assert_ne!(cache_key(&a), cache_key(&b));
    }

    #[tokio::test]
    async fn caches_and_reuses_connections() {
        let manager = ConnectionManager::new();
        let cfg = config(":memory:");

        let first = manager.get(&cfg).await.unwrap();
        let second = manager.get(&cfg).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.cached_count().await, 1);

        manager.remove(&cfg).await;
        assert_eq!(manager.cached_count().await, 0);
    }
}
