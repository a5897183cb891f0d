//! Query execution.
//!
//! [`QueryExecutor`] runs a [`Query`] against a [`Pool`] with logging and
//! timing. The backend modules below hold the actual driver calls and share
//! one layout, so differences between backends stand out.

use crate::db::placeholders::PreparedSql;
use crate::db::pool::{DbPool, Pool};
use crate::db::types::RowToJson;
use crate::error::DbResult;
use crate::models::{Query, QueryParam, QueryResult, Row};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Statements slower than this are logged at warn level.
pub const DEFAULT_SLOW_QUERY_THRESHOLD: Duration = Duration::from_secs(1);

/// Runs parameterized statements on a pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    slow_query_threshold: Duration,
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self {
            slow_query_threshold: DEFAULT_SLOW_QUERY_THRESHOLD,
        }
    }

    pub fn with_slow_query_threshold(threshold: Duration) -> Self {
        Self {
            slow_query_threshold: threshold,
        }
    }

    /// Run a statement and return its rows.
    pub async fn run(&self, pool: &Pool, query: &Query) -> DbResult<QueryResult> {
        debug!(
            pool = %pool.name(),
            sql = %query.text,
            params = query.values.len(),
            "Executing query"
        );

        let result = pool
            .request()
            .inputs(query.values.iter().cloned())
            .query(&query.text)
            .await?;

        self.note_duration(&query.text, Duration::from_millis(result.execution_time_ms));
        debug!(
            rows = result.rows.len(),
            execution_time_ms = result.execution_time_ms,
            "Query completed"
        );
        Ok(result)
    }

    /// Run a write statement and return the number of affected rows.
    pub async fn run_write(&self, pool: &Pool, query: &Query) -> DbResult<u64> {
        let start = Instant::now();
        debug!(
            pool = %pool.name(),
            sql = %query.text,
            params = query.values.len(),
            "Executing write"
        );

        let rows_affected = pool
            .request()
            .inputs(query.values.iter().cloned())
            .execute(&query.text)
            .await?;

        self.note_duration(&query.text, start.elapsed());
        debug!(rows_affected, "Write completed");
        Ok(rows_affected)
    }

    fn note_duration(&self, sql: &str, elapsed: Duration) {
        if elapsed >= self.slow_query_threshold {
            warn!(
                sql = %sql,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow query"
            );
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch every row of a prepared statement as column names plus JSON rows.
pub(crate) async fn fetch_rows(
    pool: &DbPool,
    prepared: &PreparedSql,
    values: &[QueryParam],
) -> DbResult<(Vec<String>, Vec<Row>)> {
    match pool {
        DbPool::MySql(p) => Ok(to_json(mysql::fetch_rows(p, prepared, values).await?)),
        DbPool::Postgres(p) => Ok(to_json(postgres::fetch_rows(p, prepared, values).await?)),
        DbPool::SQLite(p) => Ok(to_json(sqlite::fetch_rows(p, prepared, values).await?)),
    }
}

/// Execute a prepared statement and return the affected row count.
pub(crate) async fn execute_write(
    pool: &DbPool,
    prepared: &PreparedSql,
    values: &[QueryParam],
) -> DbResult<u64> {
    match pool {
        DbPool::MySql(p) => mysql::execute_write(p, prepared, values).await,
        DbPool::Postgres(p) => postgres::execute_write(p, prepared, values).await,
        DbPool::SQLite(p) => sqlite::execute_write(p, prepared, values).await,
    }
}

/// An empty result carries no column names.
fn to_json<R: RowToJson>(rows: Vec<R>) -> (Vec<String>, Vec<Row>) {
    let columns = rows.first().map(|r| r.column_names()).unwrap_or_default();
    let rows = rows.iter().map(|r| r.to_row()).collect();
    (columns, rows)
}

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql;
    use sqlx::MySqlPool;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_rows(
        pool: &MySqlPool,
        prepared: &PreparedSql,
        values: &[QueryParam],
    ) -> DbResult<Vec<MySqlRow>> {
        // Statements without values go through the text protocol
        if prepared.has_params() {
            let query = bind_mysql(sqlx::query(&prepared.sql), values, &prepared.bind_order);
            Ok(query.fetch_all(pool).await?)
        } else {
            use sqlx::Executor;
            Ok(pool.fetch_all(prepared.sql.as_str()).await?)
        }
    }

    pub async fn execute_write(
        pool: &MySqlPool,
        prepared: &PreparedSql,
        values: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if prepared.has_params() {
            let query = bind_mysql(sqlx::query(&prepared.sql), values, &prepared.bind_order);
            query.execute(pool).await?
        } else {
            use sqlx::Executor;
            pool.execute(prepared.sql.as_str()).await?
        };
        Ok(result.rows_affected())
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres;
    use sqlx::PgPool;
    use sqlx::postgres::PgRow;

    pub async fn fetch_rows(
        pool: &PgPool,
        prepared: &PreparedSql,
        values: &[QueryParam],
    ) -> DbResult<Vec<PgRow>> {
        if prepared.has_params() {
            let query = bind_postgres(sqlx::query(&prepared.sql), values, &prepared.bind_order);
            Ok(query.fetch_all(pool).await?)
        } else {
            use sqlx::Executor;
            Ok(pool.fetch_all(prepared.sql.as_str()).await?)
        }
    }

    pub async fn execute_write(
        pool: &PgPool,
        prepared: &PreparedSql,
        values: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if prepared.has_params() {
            let query = bind_postgres(sqlx::query(&prepared.sql), values, &prepared.bind_order);
            query.execute(pool).await?
        } else {
            use sqlx::Executor;
            pool.execute(prepared.sql.as_str()).await?
        };
        Ok(result.rows_affected())
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        prepared: &PreparedSql,
        values: &[QueryParam],
    ) -> DbResult<Vec<SqliteRow>> {
        if prepared.has_params() {
            let query = bind_sqlite(sqlx::query(&prepared.sql), values, &prepared.bind_order);
            Ok(query.fetch_all(pool).await?)
        } else {
            use sqlx::Executor;
            Ok(pool.fetch_all(prepared.sql.as_str()).await?)
        }
    }

    pub async fn execute_write(
        pool: &SqlitePool,
        prepared: &PreparedSql,
        values: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if prepared.has_params() {
            let query = bind_sqlite(sqlx::query(&prepared.sql), values, &prepared.bind_order);
            query.execute(pool).await?
        } else {
            use sqlx::Executor;
            pool.execute(prepared.sql.as_str()).await?
        };
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_defaults() {
        let executor = QueryExecutor::default();
        assert_eq!(executor.slow_query_threshold, DEFAULT_SLOW_QUERY_THRESHOLD);
    }

    #[test]
    fn test_custom_slow_query_threshold() {
        let executor = QueryExecutor::with_slow_query_threshold(Duration::from_millis(250));
        assert_eq!(executor.slow_query_threshold, Duration::from_millis(250));
    }
}
