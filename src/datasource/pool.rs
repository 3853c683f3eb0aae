use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::models::PoolSizing;

/// A resource the bounded pool can hold: validatable and closable.
#[async_trait]
pub trait PoolableResource: Send {
    async fn is_valid(&mut self) -> bool;
    async fn close(&mut self);
}

/// Runtime pool sizing, derived from the persisted `PoolSizing` knobs.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub min: usize,
    pub max: usize,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&PoolSizing::default())
    }
}

impl From<&PoolSizing> for PoolSettings {
    fn from(sizing: &PoolSizing) -> Self {
        Self {
            min: sizing.min_connections as usize,
            max: (sizing.max_connections.max(1)) as usize,
            idle_timeout: Duration::from_secs(sizing.idle_timeout_secs),
            max_lifetime: Duration::from_secs(sizing.max_lifetime_secs),
            acquire_timeout: Duration::from_secs(sizing.acquire_timeout_secs),
        }
    }
}

/// Snapshot of pool occupancy plus a liveness verdict.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub active: usize,
    pub idle: usize,
    pub max: usize,
    pub healthy: bool,
}

/// Factory the pool calls to open a fresh resource.
pub type Opener<R> = Box<dyn Fn() -> BoxFuture<'static, Result<R, CoreError>> + Send + Sync>;

struct IdleEntry<R> {
    resource: R,
    created_at: Instant,
    idle_since: Instant,
}

impl<R> IdleEntry<R> {
    fn expired(&self, settings: &PoolSettings) -> bool {
        let now = Instant::now();
        now.duration_since(self.created_at) > settings.max_lifetime
            || now.duration_since(self.idle_since) > settings.idle_timeout
    }
}

struct PoolInner<R: PoolableResource> {
    settings: PoolSettings,
    idle: Mutex<VecDeque<IdleEntry<R>>>,
    permits: Arc<Semaphore>,
    opener: Opener<R>,
    active: AtomicUsize,
}

/// Bounded connection pool for drivers without one of their own.
///
/// Checkouts are capped at `max` by a semaphore; `acquire` waits up to
/// `acquire_timeout` and then fails with `PoolExhausted`. Idle entries past
/// their idle timeout or max lifetime are discarded on checkout rather than
/// reused.
pub struct ConnectionPool<R: PoolableResource + 'static> {
    inner: Arc<PoolInner<R>>,
}

impl<R: PoolableResource + 'static> Clone for ConnectionPool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A checked-out resource.
///
/// Return it with `ConnectionPool::release` so it can be validated and put
/// back on the idle set; dropping it instead discards the resource.
pub struct PooledConnection<R: PoolableResource + 'static> {
    resource: Option<R>,
    created_at: Instant,
    _permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner<R>>,
}

impl<R: PoolableResource + 'static> Deref for PooledConnection<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource.as_ref().expect("resource already released")
    }
}

impl<R: PoolableResource + 'static> DerefMut for PooledConnection<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.resource.as_mut().expect("resource already released")
    }
}

impl<R: PoolableResource + 'static> Drop for PooledConnection<R> {
    fn drop(&mut self) {
        if self.resource.take().is_some() {
            // Dropped without release: the resource is discarded, not reused.
            self.pool.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl<R: PoolableResource + 'static> ConnectionPool<R> {
    /// Build the pool and pre-open `min` connections.
    ///
    /// Warm-up failures are logged and tolerated; the pool still opens lazily
    /// on demand.
    pub async fn open(settings: PoolSettings, opener: Opener<R>) -> Self {
        let inner = Arc::new(PoolInner {
            permits: Arc::new(Semaphore::new(settings.max)),
            idle: Mutex::new(VecDeque::new()),
            opener,
            active: AtomicUsize::new(0),
            settings,
        });

        let now = Instant::now();
        for _ in 0..inner.settings.min {
            match (inner.opener)().await {
                Ok(resource) => {
                    inner.idle.lock().await.push_back(IdleEntry {
                        resource,
                        created_at: now,
                        idle_since: now,
                    });
                }
                Err(e) => {
                    warn!("Pool warm-up connection failed: {}", e);
                    break;
                }
            }
        }

        Self { inner }
    }

    pub async fn acquire(&self) -> Result<PooledConnection<R>, CoreError> {
        self.acquire_with_timeout(self.inner.settings.acquire_timeout)
            .await
    }

    async fn acquire_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PooledConnection<R>, CoreError> {
        let started = Instant::now();
        let permit = match tokio::time::timeout(
            timeout,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(CoreError::Connection("connection pool is closed".into())),
            Err(_) => {
                return Err(CoreError::PoolExhausted {
                    waited_ms: started.elapsed().as_millis() as u64,
                })
            }
        };

        // Prefer a live idle connection; evict stale or broken ones.
        loop {
            let entry = self.inner.idle.lock().await.pop_front();
            let Some(mut entry) = entry else { break };
            if entry.expired(&self.inner.settings) {
                debug!("Evicting expired idle connection");
                entry.resource.close().await;
                continue;
            }
            if !entry.resource.is_valid().await {
                debug!("Discarding invalid idle connection");
                entry.resource.close().await;
                continue;
            }
            self.inner.active.fetch_add(1, Ordering::SeqCst);
            return Ok(PooledConnection {
                resource: Some(entry.resource),
                created_at: entry.created_at,
                _permit: Some(permit),
                pool: Arc::clone(&self.inner),
            });
        }

        let resource = (self.inner.opener)().await?;
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            resource: Some(resource),
            created_at: Instant::now(),
            _permit: Some(permit),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Validate and return a connection to the idle set, or close and discard
    /// it when it is past its lifetime or no longer valid.
    pub async fn release(&self, mut conn: PooledConnection<R>) {
        let Some(mut resource) = conn.resource.take() else {
            return;
        };
        self.inner.active.fetch_sub(1, Ordering::SeqCst);

        let within_lifetime =
            conn.created_at.elapsed() <= self.inner.settings.max_lifetime;
        if within_lifetime && resource.is_valid().await {
            self.inner.idle.lock().await.push_back(IdleEntry {
                resource,
                created_at: conn.created_at,
                idle_since: Instant::now(),
            });
        } else {
            debug!("Closing connection on release (expired or invalid)");
            resource.close().await;
        }
        // The permit drops with `conn`, freeing the slot.
    }

    /// Occupancy counts and a liveness verdict from a short acquire probe.
    pub async fn status(&self) -> PoolStatus {
        let healthy = match self.acquire_with_timeout(Duration::from_millis(250)).await {
            Ok(conn) => {
                self.release(conn).await;
                true
            }
            Err(_) => false,
        };

        let idle = self.inner.idle.lock().await.len();
        PoolStatus {
            active: self.inner.active.load(Ordering::SeqCst),
            idle,
            max: self.inner.settings.max,
            healthy,
        }
    }

    /// Close every idle connection. Checked-out connections are discarded when
    /// dropped or released.
    pub async fn close(&self) {
        let mut idle = self.inner.idle.lock().await;
        while let Some(mut entry) = idle.pop_front() {
            entry.resource.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct MockConn {
        id: usize,
        valid: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PoolableResource for MockConn {
        async fn is_valid(&mut self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn mock_opener(
        opened: Arc<AtomicUsize>,
        valid: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    ) -> Opener<MockConn> {
        Box::new(move || {
            let opened = Arc::clone(&opened);
            let valid = Arc::clone(&valid);
            let closed = Arc::clone(&closed);
            Box::pin(async move {
                let id = opened.fetch_add(1, Ordering::SeqCst);
                Ok(MockConn { id, valid, closed })
            })
        })
    }

    fn settings(min: usize, max: usize, acquire_ms: u64) -> PoolSettings {
        PoolSettings {
            min,
            max,
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
            acquire_timeout: Duration::from_millis(acquire_ms),
        }
    }

    #[tokio::test]
    async fn exhausted_pool_times_out_with_error() {
        let opened = Arc::new(AtomicUsize::new(0));
        let valid = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(AtomicBool::new(false));
        let pool = ConnectionPool::open(
            settings(0, 2, 200),
            mock_opener(opened, valid, closed),
        )
        .await;

        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();

        let err = pool.acquire().await.map(|_| ()).unwrap_err();
        assert!(matches!(err, CoreError::PoolExhausted { .. }));

        // Releasing frees a slot again.
        pool.release(a).await;
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn released_connections_are_reused() {
        let opened = Arc::new(AtomicUsize::new(0));
        let valid = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(AtomicBool::new(false));
        let pool = ConnectionPool::open(
            settings(0, 4, 200),
            mock_opener(Arc::clone(&opened), valid, closed),
        )
        .await;

        let first = pool.acquire().await.unwrap();
        let first_id = first.id;
        pool.release(first).await;

        let second = pool.acquire().await.unwrap();
        assert_eq!(second.id, first_id);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_connection_never_returns_to_idle() {
        let opened = Arc::new(AtomicUsize::new(0));
        let valid = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(AtomicBool::new(false));
        let pool = ConnectionPool::open(
            settings(0, 4, 200),
            mock_opener(Arc::clone(&opened), Arc::clone(&valid), Arc::clone(&closed)),
        )
        .await;

        let conn = pool.acquire().await.unwrap();
        valid.store(false, Ordering::SeqCst);
        pool.release(conn).await;

        assert!(closed.load(Ordering::SeqCst));
        let status = pool.status().await;
        // The broken connection was discarded; the probe opened a fresh one.
        assert_eq!(status.idle, 0);
        assert!(!status.healthy || opened.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn warm_up_opens_min_connections() {
        let opened = Arc::new(AtomicUsize::new(0));
        let valid = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(AtomicBool::new(false));
        let pool = ConnectionPool::open(
            settings(2, 4, 200),
            mock_opener(Arc::clone(&opened), valid, closed),
        )
        .await;

        assert_eq!(opened.load(Ordering::SeqCst), 2);
        let status = pool.status().await;
        assert_eq!(status.max, 4);
        assert!(status.healthy);
    }

    #[tokio::test]
    async fn lifetime_expired_connections_are_retired() {
        let opened = Arc::new(AtomicUsize::new(0));
        let valid = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(AtomicBool::new(false));
        let mut s = settings(0, 2, 200);
        s.max_lifetime = Duration::from_millis(10);
        let pool = ConnectionPool::open(
            s,
            mock_opener(Arc::clone(&opened), valid, Arc::clone(&closed)),
        )
        .await;

        let conn = pool.acquire().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.release(conn).await;

        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(pool.inner.idle.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn blocked_acquire_proceeds_when_peer_releases() {
        let opened = Arc::new(AtomicUsize::new(0));
        let valid = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(AtomicBool::new(false));
        let pool = ConnectionPool::open(
            settings(0, 1, 1000),
            mock_opener(opened, valid, closed),
        )
        .await;

        let held = pool.acquire().await.unwrap();
        let contender = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|c| c.id) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.release(held).await;

        let got = contender.await.unwrap();
        assert!(got.is_ok());
    }
}
