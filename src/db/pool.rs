//! Named connection pools and the request builder used to run statements.
//!
//! A [`Pool`] wraps a backend-specific sqlx pool (MySqlPool, PgPool,
//! SqlitePool) so every backend keeps full type support.

use crate::config::PoolOptions;
use crate::db::executor;
use crate::db::placeholders::prepare_sql;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType, QueryParam, QueryResult};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{MySqlPool, PgPool, SqlitePool};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::SQLite(pool) => pool.is_closed(),
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// A live pool registered under a name.
///
/// `generation` increases every time the registry opens a pool, so a caller
/// can tell a reopened pool from the one it saw before.
pub struct Pool {
    name: String,
    generation: u64,
    backend: DbPool,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("db_type", &self.backend.db_type())
            .finish()
    }
}

impl Pool {
    /// Connect to the target described by `config`.
    ///
    /// At least one connection is established before returning, so
    /// unreachable servers and bad credentials surface here.
    pub async fn open(
        name: impl Into<String>,
        generation: u64,
        config: &ConnectionConfig,
    ) -> DbResult<Self> {
        let name = name.into();
        let db_type = config.db_type();
        let opts = config.pool_options();
        let connect_error = |e: sqlx::Error| {
            DbError::connection(
                format!("Failed to connect pool {}: {}", name, e),
                connection_suggestion(db_type, &e),
            )
        };

        info!(
            pool = %name,
            generation,
            db_type = %db_type,
            server = %config.server(),
            database = %config.database(),
            "Opening connection pool"
        );

        let backend = match db_type {
            DatabaseType::PostgreSQL => {
                let pool = pool_builder(opts, false)
                    .connect_with(postgres_options(config))
                    .await
                    .map_err(connect_error)?;
                DbPool::Postgres(pool)
            }
            DatabaseType::MySQL => {
                let pool = pool_builder(opts, false)
                    .connect_with(mysql_options(config))
                    .await
                    .map_err(connect_error)?;
                DbPool::MySql(pool)
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::new()
                    .filename(config.database())
                    .create_if_missing(true);
                let pool = pool_builder(opts, true)
                    .connect_with(options)
                    .await
                    .map_err(connect_error)?;
                DbPool::SQLite(pool)
            }
        };

        debug!(pool = %name, generation, "Connection pool ready");
        Ok(Self {
            name,
            generation,
            backend,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn db_type(&self) -> DatabaseType {
        self.backend.db_type()
    }

    /// The underlying sqlx pool.
    pub fn backend(&self) -> &DbPool {
        &self.backend
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_closed()
    }

    /// Start a request against this pool.
    pub fn request(&self) -> Request<'_> {
        Request {
            pool: self,
            values: Vec::new(),
        }
    }

    /// Close the pool.
    ///
    /// New acquisitions fail immediately. If checked-out connections are not
    /// returned within `timeout` the close is reported as failed; the pool
    /// stays closed either way.
    pub async fn close(&self, timeout: Duration) -> DbResult<()> {
        info!(pool = %self.name, generation = self.generation, "Closing connection pool");
        match tokio::time::timeout(timeout, self.backend.close()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(
                    pool = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Connections were not returned before the close timeout"
                );
                Err(DbError::timeout(format!("closing pool {}", self.name), timeout))
            }
        }
    }
}

/// A statement being assembled: positional values, then `query` or `execute`.
#[derive(Debug)]
pub struct Request<'p> {
    pool: &'p Pool,
    values: Vec<QueryParam>,
}

impl Request<'_> {
    /// Bind the next positional value.
    pub fn input(mut self, value: impl Into<QueryParam>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn inputs(mut self, values: impl IntoIterator<Item = QueryParam>) -> Self {
        self.values.extend(values);
        self
    }

    /// Run a statement and collect every row it returns.
    pub async fn query(self, sql: &str) -> DbResult<QueryResult> {
        let prepared = prepare_sql(sql, self.values.len(), self.pool.db_type())?;
        let start = Instant::now();
        let (columns, rows) =
            executor::fetch_rows(&self.pool.backend, &prepared, &self.values).await?;
        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(self, sql: &str) -> DbResult<u64> {
        let prepared = prepare_sql(sql, self.values.len(), self.pool.db_type())?;
        executor::execute_write(&self.pool.backend, &prepared, &self.values).await
    }
}

fn pool_builder<DB: sqlx::Database>(opts: &PoolOptions, is_sqlite: bool) -> sqlx::pool::PoolOptions<DB> {
    sqlx::pool::PoolOptions::<DB>::new()
        .min_connections(opts.min_connections_or_default())
        .max_connections(opts.max_connections_or_default(is_sqlite))
        .acquire_timeout(opts.acquire_timeout_or_default())
        .idle_timeout(Some(opts.idle_timeout_or_default()))
        .test_before_acquire(opts.test_before_acquire_or_default())
}

fn postgres_options(config: &ConnectionConfig) -> PgConnectOptions {
    let ssl_mode = match (config.encrypt(), config.trust_server_certificate()) {
        (false, _) => PgSslMode::Disable,
        (true, true) => PgSslMode::Require,
        (true, false) => PgSslMode::VerifyFull,
    };
    let mut options = PgConnectOptions::new()
        .host(config.server())
        .database(config.database())
        .ssl_mode(ssl_mode);
    if let Some(port) = config.port() {
        options = options.port(port);
    }
    if let Some(user) = config.user() {
        options = options.username(user);
    }
    if let Some(password) = config.password() {
        options = options.password(password);
    }
    options
}

fn mysql_options(config: &ConnectionConfig) -> MySqlConnectOptions {
    let ssl_mode = match (config.encrypt(), config.trust_server_certificate()) {
        (false, _) => MySqlSslMode::Disabled,
        (true, true) => MySqlSslMode::Required,
        (true, false) => MySqlSslMode::VerifyIdentity,
    };
    let mut options = MySqlConnectOptions::new()
        .host(config.server())
        .database(config.database())
        .ssl_mode(ssl_mode)
        .charset("utf8mb4");
    if let Some(port) = config.port() {
        options = options.port(port);
    }
    if let Some(user) = config.user() {
        options = options.username(user);
    }
    if let Some(password) = config.password() {
        options = options.password(password);
    }
    options
}

fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {} server is running and reachable", db_type);
    }
    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user and password".to_string();
    }
    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database exists".to_string();
    }
    if error_str.contains("tls") || error_str.contains("ssl") || error_str.contains("certificate") {
        return "Check the encrypt and trust_server_certificate settings".to_string();
    }
    match db_type {
        DatabaseType::SQLite => "Check that the database file path is writable".to_string(),
        _ => format!(
            "Check the server address and port for {}",
            db_type.display_name()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(db_type: DatabaseType, encrypt: bool, trust: bool) -> ConnectionConfig {
        ConnectionConfig::new(db_type, "flashcards")
            .unwrap()
            .with_transport(encrypt, trust)
    }

    #[test]
    fn test_postgres_ssl_mode_mapping() {
        let opts = postgres_options(&config(DatabaseType::PostgreSQL, false, false));
        assert!(matches!(opts.get_ssl_mode(), PgSslMode::Disable));
        let opts = postgres_options(&config(DatabaseType::PostgreSQL, true, true));
        assert!(matches!(opts.get_ssl_mode(), PgSslMode::Require));
        let opts = postgres_options(&config(DatabaseType::PostgreSQL, true, false));
        assert!(matches!(opts.get_ssl_mode(), PgSslMode::VerifyFull));
    }

    #[test]
    fn test_postgres_options_use_config_target() {
        let cfg = config(DatabaseType::PostgreSQL, false, false)
            .with_server("db.internal")
            .with_port(6543)
            .with_credentials("app", "secret");
        let opts = postgres_options(&cfg);
        assert_eq!(opts.get_host(), "db.internal");
        assert_eq!(opts.get_port(), 6543);
        assert_eq!(opts.get_username(), "app");
        assert_eq!(opts.get_database(), Some("flashcards"));
    }

    #[test]
    fn test_connection_suggestion_refused() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ));
        assert!(connection_suggestion(DatabaseType::MySQL, &err).contains("running"));
    }

    #[tokio::test]
    async fn test_sqlite_pool_request_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.db");
        let cfg = ConnectionConfig::new(DatabaseType::SQLite, path.to_string_lossy()).unwrap();
        let pool = Pool::open(cfg.pool_name(), 1, &cfg).await.unwrap();
        assert_eq!(pool.db_type(), DatabaseType::SQLite);

        pool.request()
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT)")
            .await
            .unwrap();
        let affected = pool
            .request()
            .input(1)
            .input("one")
            .execute("INSERT INTO t (id, label) VALUES (?, ?)")
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let result = pool.request().input(1).query("SELECT label FROM t WHERE id = $1").await.unwrap();
        assert_eq!(result.columns, vec!["label".to_string()]);
        assert_eq!(result.rows[0]["label"], "one");

        pool.close(Duration::from_secs(5)).await.unwrap();
        assert!(pool.is_closed());
    }
}
