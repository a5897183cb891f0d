//! Error types for the flashcard database core.
//!
//! This module defines all error types using `thiserror`. Driver errors are
//! classified once, when they are converted into [`DbError`], so that callers
//! decide retryability with a type-level match instead of inspecting codes.

use std::fmt;
use thiserror::Error;

/// PostgreSQL SQLSTATE for `deadlock_detected`.
pub const POSTGRES_DEADLOCK_SQLSTATE: &str = "40P01";

/// MySQL server error number `ER_LOCK_DEADLOCK`.
pub const MYSQL_DEADLOCK_ERRNO: u16 = 1213;

/// SQLite primary result code `SQLITE_BUSY`.
pub const SQLITE_BUSY_CODE: i32 = 5;

/// Classification of a failed query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Lock contention reported by the server. The only retryable kind.
    Deadlock,
    /// Unique, foreign key, not-null or check violation.
    Constraint,
    Other,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadlock => write!(f, "deadlock"),
            Self::Constraint => write!(f, "constraint"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Query failed ({kind}): {message}")]
    Query {
        message: String,
        /// Driver error code, e.g. "40P01" or "1213"
        code: Option<String>,
        kind: QueryErrorKind,
    },

    #[error("Pool {name} does not exist")]
    PoolNotFound { name: String },

    #[error("Parameter mismatch: query references {expected} placeholder(s) but {actual} value(s) were bound")]
    ParameterMismatch { expected: usize, actual: usize },

    #[error("Failed to close {} pool(s): {}", .failures.len(), PoolCloseFailure::join(.failures))]
    PoolsCloseFailed { failures: Vec<PoolCloseFailure> },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// A single pool that could not be closed by `close_all`.
#[derive(Debug)]
pub struct PoolCloseFailure {
    pub name: String,
    pub error: DbError,
}

impl PoolCloseFailure {
    fn join(failures: &[PoolCloseFailure]) -> String {
        failures
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for PoolCloseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error with an explicit classification.
    pub fn query(message: impl Into<String>, code: Option<String>, kind: QueryErrorKind) -> Self {
        Self::Query {
            message: message.into(),
            code,
            kind,
        }
    }

    /// Create a lock-contention query error.
    pub fn deadlock(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::query(message, Some(code.into()), QueryErrorKind::Deadlock)
    }

    pub fn pool_not_found(name: impl Into<String>) -> Self {
        Self::PoolNotFound { name: name.into() }
    }

    pub fn parameter_mismatch(expected: usize, actual: usize) -> Self {
        Self::ParameterMismatch { expected, actual }
    }

    pub fn timeout(operation: impl Into<String>, elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::ParameterMismatch { .. } => {
                Some("Bind exactly one value per referenced placeholder")
            }
            _ => None,
        }
    }

    /// Query classification, if this is an execution failure.
    pub fn query_kind(&self) -> Option<QueryErrorKind> {
        match self {
            Self::Query { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Check if this error is the retryable lock-contention kind.
    pub fn is_deadlock(&self) -> bool {
        self.query_kind() == Some(QueryErrorKind::Deadlock)
    }
}

/// Classify a server-reported error by its backend-specific code.
fn classify(
    db_err: &(dyn sqlx::error::DatabaseError + 'static),
) -> (Option<String>, QueryErrorKind) {
    if let Some(mysql) = db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
        let number = mysql.number();
        let kind = if number == MYSQL_DEADLOCK_ERRNO {
            QueryErrorKind::Deadlock
        } else {
            constraint_or_other(db_err)
        };
        return (Some(number.to_string()), kind);
    }

    let code = db_err.code().map(|c| c.to_string());
    let kind = match code.as_deref() {
        Some(POSTGRES_DEADLOCK_SQLSTATE) => QueryErrorKind::Deadlock,
        Some(c) if db_err.try_downcast_ref::<sqlx::sqlite::SqliteError>().is_some() => {
            // Extended result codes carry the primary code in the low byte
            match c.parse::<i32>() {
                Ok(extended) if extended & 0xff == SQLITE_BUSY_CODE => QueryErrorKind::Deadlock,
                _ => constraint_or_other(db_err),
            }
        }
        _ => constraint_or_other(db_err),
    };
    (code, kind)
}

fn constraint_or_other(db_err: &(dyn sqlx::error::DatabaseError + 'static)) -> QueryErrorKind {
    use sqlx::error::ErrorKind;
    match db_err.kind() {
        ErrorKind::UniqueViolation
        | ErrorKind::ForeignKeyViolation
        | ErrorKind::NotNullViolation
        | ErrorKind::CheckViolation => QueryErrorKind::Constraint,
        _ => QueryErrorKind::Other,
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let (code, kind) = classify(db_err.as_ref());
                DbError::query(db_err.message(), code, kind)
            }
            sqlx::Error::RowNotFound => {
                DbError::query("No rows returned", None, QueryErrorKind::Other)
            }
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Raise acquire_timeout or max_connections, or check for leaked connections",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Request the pool again")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify the encrypt and trust_server_certificate settings",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
