//! Deadlock-aware retries.
//!
//! Only errors classified as [`QueryErrorKind::Deadlock`] are retried. Every
//! other failure, connectivity loss included, propagates after the attempt
//! that produced it.
//!
//! [`QueryErrorKind::Deadlock`]: crate::error::QueryErrorKind::Deadlock

use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS};
use crate::db::executor::QueryExecutor;
use crate::db::registry::PoolRegistry;
use crate::error::DbResult;
use crate::models::{ConnectionConfig, Query, QueryResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_retries` counts total attempts, so it must be at least 1.
    pub fn new(max_retries: u32, delay: Duration) -> Result<Self, String> {
        if max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }
        Ok(Self { max_retries, delay })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-deadlock error, or
/// `policy.max_retries()` attempts have been made.
///
/// The error of the last attempt is returned when attempts run out. The wait
/// between attempts is an async sleep and holds no locks.
pub async fn retry_on_deadlock<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) if err.is_deadlock() && attempt < policy.max_retries => {
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "Deadlock detected, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_deadlock() {
                    warn!(attempt, error = %err, "Deadlock persisted, giving up");
                }
                return Err(err);
            }
        }
    }
}

/// Executes statements on the pool for one database, retrying deadlocks.
///
/// The pool is looked up on every attempt, so a pool closed between attempts
/// is transparently reopened.
#[derive(Debug, Clone)]
pub struct RetryingExecutor {
    registry: Arc<PoolRegistry>,
    config: Arc<ConnectionConfig>,
    executor: QueryExecutor,
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(registry: Arc<PoolRegistry>, config: ConnectionConfig, policy: RetryPolicy) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            executor: QueryExecutor::new(),
            policy,
        }
    }

    pub fn with_executor(mut self, executor: QueryExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a statement and return its rows.
    pub async fn query(&self, query: &Query) -> DbResult<QueryResult> {
        let name = self.config.pool_name();
        let (name, registry, config, executor) =
            (name.as_str(), &self.registry, &self.config, &self.executor);
        retry_on_deadlock(&self.policy, || async move {
            let pool = registry.get(name, config).await?;
            executor.run(&pool, query).await
        })
        .await
    }

    /// Run a write statement and return the number of affected rows.
    pub async fn execute(&self, query: &Query) -> DbResult<u64> {
        let name = self.config.pool_name();
        let (name, registry, config, executor) =
            (name.as_str(), &self.registry, &self.config, &self.executor);
        retry_on_deadlock(&self.policy, || async move {
            let pool = registry.get(name, config).await?;
            executor.run_write(&pool, query).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbError, QueryErrorKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(RetryPolicy::new(0, Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_single_attempt_policy_never_retries() {
        let attempts = &AtomicU32::new(0);
        let result: DbResult<()> = retry_on_deadlock(&fast_policy(1), || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(DbError::deadlock("deadlock detected", "40P01"))
        })
        .await;
        assert!(result.unwrap_err().is_deadlock());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_constraint_error_not_retried() {
        let attempts = &AtomicU32::new(0);
        let result: DbResult<()> = retry_on_deadlock(&fast_policy(5), || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(DbError::query(
                "duplicate key",
                Some("23505".into()),
                QueryErrorKind::Constraint,
            ))
        })
        .await;
        assert_eq!(
            result.unwrap_err().query_kind(),
            Some(QueryErrorKind::Constraint)
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
