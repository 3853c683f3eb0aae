use std::env;
use std::time::Duration;

use anyhow::Result;

/// Core runtime settings, loaded from the environment with sane defaults.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Row cap appended to test queries that carry no limit of their own.
    pub default_row_limit: i64,
    /// Fan-out width for batch test execution.
    pub batch_concurrency: usize,
    /// How long an acquire may wait on an exhausted pool.
    pub pool_acquire_timeout: Duration,
    /// Audit records older than this are eligible for purging.
    pub audit_retention_days: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_row_limit: 500,
            batch_concurrency: 4,
            pool_acquire_timeout: Duration::from_secs(5),
            audit_retention_days: 90,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Ok(CoreConfig {
            default_row_limit: env_parse("QUERYFAB_ROW_LIMIT", defaults.default_row_limit),
            batch_concurrency: env_parse("QUERYFAB_BATCH_CONCURRENCY", defaults.batch_concurrency),
            pool_acquire_timeout: Duration::from_secs(env_parse(
                "QUERYFAB_ACQUIRE_TIMEOUT_SECS",
                defaults.pool_acquire_timeout.as_secs(),
            )),
            audit_retention_days: env_parse(
                "QUERYFAB_AUDIT_RETENTION_DAYS",
                defaults.audit_retention_days,
            ),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}
