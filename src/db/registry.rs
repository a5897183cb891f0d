//! Registry of named connection pools.
//!
//! # Design
//!
//! - **`OnceCell` per pool name**: concurrent first requests for a name wait
//!   on the same cell, so exactly one pool is opened.
//! - **Registration on success**: a cell only counts as registered once it
//!   holds a pool. A failed open leaves nothing behind and the next request
//!   tries again.
//! - **Closes outside the lock**: entries are removed under the write lock,
//!   then closed without it, so a slow close never blocks unrelated lookups.
//!
//! The registry is an ordinary value. Construct one at startup and share it
//! through an `Arc`.

use crate::config::DEFAULT_CLOSE_TIMEOUT_SECS;
use crate::db::pool::Pool;
use crate::error::{DbError, DbResult, PoolCloseFailure};
use crate::models::ConnectionConfig;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info};

type PoolCell = Arc<OnceCell<Arc<Pool>>>;

pub struct PoolRegistry {
    pools: RwLock<HashMap<String, PoolCell>>,
    /// Last generation handed to an open attempt.
    generation: AtomicU64,
    /// Pools successfully opened over the registry's lifetime.
    opened: AtomicUsize,
    close_timeout: Duration,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::with_close_timeout(Duration::from_secs(DEFAULT_CLOSE_TIMEOUT_SECS))
    }

    /// A registry whose closes fail if connections are not returned within `close_timeout`.
    pub fn with_close_timeout(close_timeout: Duration) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            opened: AtomicUsize::new(0),
            close_timeout,
        }
    }

    /// Return the pool registered as `name`, opening it from `config` first if needed.
    ///
    /// An existing pool is returned as is; `config` is only read when a new
    /// pool must be opened.
    pub async fn get(&self, name: &str, config: &ConnectionConfig) -> DbResult<Arc<Pool>> {
        let cell = self.cell_for(name).await;

        let result = cell
            .get_or_try_init(|| async {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let pool = Pool::open(name, generation, config).await?;
                self.opened.fetch_add(1, Ordering::SeqCst);
                info!(pool = %name, generation, "Registered connection pool");
                Ok::<_, DbError>(Arc::new(pool))
            })
            .await;

        match result {
            Ok(pool) => Ok(Arc::clone(pool)),
            Err(e) => {
                self.discard_empty(name, &cell).await;
                Err(e)
            }
        }
    }

    /// Close the pool registered as `name` and remove it.
    ///
    /// The entry is removed even when the close itself fails, so the next
    /// `get` always opens a fresh pool.
    pub async fn close(&self, name: &str) -> DbResult<()> {
        let pool = {
            let mut pools = self.pools.write().await;
            let registered = pools.get(name).and_then(|cell| cell.get()).cloned();
            match registered {
                Some(pool) => {
                    pools.remove(name);
                    pool
                }
                None => return Err(DbError::pool_not_found(name)),
            }
        };

        pool.close(self.close_timeout).await
    }

    /// Close every registered pool concurrently.
    ///
    /// The registry is empty afterwards whatever happens. Pools that fail to
    /// close are reported together in [`DbError::PoolsCloseFailed`].
    pub async fn close_all(&self) -> DbResult<()> {
        let drained: Vec<Arc<Pool>> = {
            let mut pools = self.pools.write().await;
            let names: Vec<String> = pools
                .iter()
                .filter(|(_, cell)| cell.initialized())
                .map(|(name, _)| name.clone())
                .collect();
            names
                .iter()
                .filter_map(|name| pools.remove(name))
                .filter_map(|cell| cell.get().cloned())
                .collect()
        };

        if drained.is_empty() {
            debug!("No pools to close");
            return Ok(());
        }

        info!(count = drained.len(), "Closing all connection pools");
        let timeout = self.close_timeout;
        let results = join_all(drained.iter().map(|pool| async move {
            (pool.name().to_string(), pool.close(timeout).await)
        }))
        .await;

        let failures: Vec<PoolCloseFailure> = results
            .into_iter()
            .filter_map(|(name, result)| {
                result.err().map(|error| {
                    error!(pool = %name, error = %error, "Failed to close pool");
                    PoolCloseFailure { name, error }
                })
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DbError::PoolsCloseFailed { failures })
        }
    }

    /// Number of registered pools.
    pub async fn len(&self) -> usize {
        let pools = self.pools.read().await;
        pools.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Registered pool names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let pools = self.pools.read().await;
        let mut names: Vec<String> = pools
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn contains(&self, name: &str) -> bool {
        let pools = self.pools.read().await;
        pools.get(name).is_some_and(|cell| cell.initialized())
    }

    /// Pools opened since the registry was created, including closed ones.
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    async fn cell_for(&self, name: &str) -> PoolCell {
        {
            let pools = self.pools.read().await;
            if let Some(cell) = pools.get(name) {
                return Arc::clone(cell);
            }
        }

        let mut pools = self.pools.write().await;
        // Another caller may have inserted while we waited for the write lock
        Arc::clone(
            pools
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Drop a cell left empty by a failed open.
    ///
    /// The cell stays when another caller still holds it: that caller may be
    /// retrying the open on it, and its pool must land in the map. Clones are
    /// only taken under the lock, so the count is stable while we hold it.
    async fn discard_empty(&self, name: &str, cell: &PoolCell) {
        let mut pools = self.pools.write().await;
        if let Some(current) = pools.get(name) {
            // One reference in the map, one held by the caller
            if Arc::ptr_eq(current, cell)
                && !current.initialized()
                && Arc::strong_count(cell) == 2
            {
                pools.remove(name);
            }
        }
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("opened", &self.opened_count())
            .field("close_timeout", &self.close_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;

    #[tokio::test]
    async fn test_close_unknown_pool_is_not_found() {
        let registry = PoolRegistry::new();
        let err = registry.close("pool-missing").await.unwrap_err();
        assert!(matches!(err, DbError::PoolNotFound { ref name } if name == "pool-missing"));
    }

    #[tokio::test]
    async fn test_close_all_on_empty_registry() {
        let registry = PoolRegistry::new();
        assert!(registry.close_all().await.is_ok());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_registered() {
        let registry = PoolRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        // SQLite does not create missing parent directories
        let path = dir.path().join("missing").join("cards.db");
        let config = ConnectionConfig::new(DatabaseType::SQLite, path.to_string_lossy()).unwrap();

        let err = registry.get("pool-bad", &config).await.unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(!registry.contains("pool-bad").await);
        assert_eq!(registry.opened_count(), 0);
        assert!(registry.pools.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_open_keeps_cell_another_caller_waits_on() {
        let registry = PoolRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.db");
        let config = ConnectionConfig::new(DatabaseType::SQLite, path.to_string_lossy()).unwrap();
        let name = config.pool_name();

        // A second caller already holds the cell and will open on it next
        let waiting = registry.cell_for(&name).await;
        let failed = registry.cell_for(&name).await;
        registry.discard_empty(&name, &failed).await;
        drop(failed);
        assert!(registry.pools.read().await.contains_key(&name));

        let opened = waiting
            .get_or_try_init(|| async {
                Ok::<_, DbError>(Arc::new(Pool::open(name.as_str(), 99, &config).await?))
            })
            .await
            .unwrap()
            .clone();

        let pool = registry.get(&name, &config).await.unwrap();
        assert!(Arc::ptr_eq(&pool, &opened));
        assert_eq!(pool.generation(), 99);
        assert_eq!(registry.opened_count(), 0);

        registry.close_all().await.unwrap();
        assert!(opened.is_closed());
    }

    #[tokio::test]
    async fn test_get_registers_under_name() {
        let registry = PoolRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.db");
        let config = ConnectionConfig::new(DatabaseType::SQLite, path.to_string_lossy()).unwrap();

        let pool = registry.get(&config.pool_name(), &config).await.unwrap();
        assert_eq!(pool.generation(), 1);
        assert_eq!(registry.names().await, vec![config.pool_name()]);

        registry.close_all().await.unwrap();
        assert!(registry.is_empty().await);
    }
}
