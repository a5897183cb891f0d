//! Configuration handling for the flashcard database core.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::db::RetryPolicy;
use crate::models::{ConnectionConfig, ConnectionConfigError, DatabaseType, QueryParam};
use clap::{ArgAction, Parser, Subcommand};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 10;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool options handed to the driver's pool as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 0)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == Some(0) {
            return Err("max_connections must be greater than 0".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_connections, self.max_connections) {
            if min > max {
                return Err(format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    min, max
                ));
            }
        }
        Ok(())
    }

    /// Take pool option keys out of parsed URL query parameters.
    /// Unparseable values are ignored.
    pub(crate) fn from_query(opts: &mut HashMap<String, String>) -> Self {
        Self {
            max_connections: opts.remove("max_connections").and_then(|v| v.parse().ok()),
            min_connections: opts.remove("min_connections").and_then(|v| v.parse().ok()),
            idle_timeout_secs: opts.remove("idle_timeout").and_then(|v| v.parse().ok()),
            acquire_timeout_secs: opts.remove("acquire_timeout").and_then(|v| v.parse().ok()),
            test_before_acquire: opts.remove("test_before_acquire").and_then(|v| {
                if v.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if v.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }),
        }
    }
}

/// Configuration for the flashcard-db command line tool.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flashcard-db",
    about = "Query the flashcard database through the shared pool registry",
    version,
    author
)]
pub struct Config {
    /// Full connection URL. Overrides the individual DB_* settings when set.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Database backend (postgres, mysql, sqlite)
    #[arg(long, default_value = "postgres", env = "DB_TYPE")]
    pub db_type: String,

    /// Database server host
    #[arg(long, default_value = "localhost", env = "DB_SERVER")]
    pub server: String,

    /// Database server port (backend default when omitted)
    #[arg(long, env = "DB_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "DB_USER")]
    pub user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database name (file path for SQLite)
    #[arg(long, env = "DB_NAME")]
    pub database: Option<String>,

    /// Encrypt the connection with TLS
    #[arg(long, env = "DB_ENCRYPT", default_value_t = true, action = ArgAction::Set)]
    pub encrypt: bool,

    /// Accept the server certificate without verification
    #[arg(
        long,
        env = "DB_TRUST_SERVER_CERTIFICATE",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub trust_server_certificate: bool,

    /// Maximum attempts for a query that hits a deadlock
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, env = "DB_MAX_RETRIES")]
    pub max_retries: u32,

    /// Pause between deadlock retries in milliseconds
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_MS, env = "DB_RETRY_DELAY_MS")]
    pub retry_delay_ms: u64,

    /// Seconds to wait for in-use connections when closing pools
    #[arg(long, default_value_t = DEFAULT_CLOSE_TIMEOUT_SECS, env = "DB_CLOSE_TIMEOUT")]
    pub close_timeout: u64,

    #[arg(long, env = "DB_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    #[arg(long, env = "DB_MIN_CONNECTIONS")]
    pub min_connections: Option<u32>,

    /// Idle connection timeout in seconds
    #[arg(long, env = "DB_IDLE_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    /// Connection acquire timeout in seconds
    #[arg(long, env = "DB_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed by the command line tool.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a statement and print the returned rows
    Query {
        sql: String,
        /// Positional parameter value (repeatable, bound in order)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<QueryParam>,
    },
    /// Run a statement and print the affected row count
    Execute {
        sql: String,
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<QueryParam>,
    },
    /// List all card sets
    CardSets,
    /// Show one card set
    CardSet { id: i64 },
    /// Create a card set
    CreateCardSet { name: String },
    /// List the cards of a set
    Cards { card_set_id: i64 },
    /// Add a card to a set
    AddCard {
        card_set_id: i64,
        front: String,
        back: String,
    },
    /// Replace the text of a card
    UpdateCard { id: i64, front: String, back: String },
    /// Delete a card
    DeleteCard { id: i64 },
}

/// Parse a CLI parameter: `null`, `true`/`false`, integers and floats keep
/// their type, anything else is bound as text.
fn parse_param(s: &str) -> Result<QueryParam, String> {
    Ok(match s {
        "null" => QueryParam::Null,
        "true" => QueryParam::Bool(true),
        "false" => QueryParam::Bool(false),
        _ => {
            if let Ok(v) = s.parse::<i64>() {
                QueryParam::Int(v)
            } else if let Ok(v) = s.parse::<f64>() {
                QueryParam::Float(v)
            } else {
                QueryParam::String(s.to_string())
            }
        }
    })
}

impl Config {
    /// Resolve the connection target from the URL or the discrete settings.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConnectionConfigError> {
        if let Some(url) = &self.database_url {
            return ConnectionConfig::from_url(url);
        }

        let db_type: DatabaseType = self.db_type.parse()?;
        let database = self
            .database
            .clone()
            .ok_or(ConnectionConfigError::EmptyDatabase)?;

        let mut config = ConnectionConfig::new(db_type, database)?
            .with_server(&self.server)
            .with_transport(self.encrypt, self.trust_server_certificate);
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(user) = &self.user {
            config = config.with_credentials(user, self.password.clone().unwrap_or_default());
        }
        config.with_pool_options(self.pool_options())
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            idle_timeout_secs: self.idle_timeout,
            acquire_timeout_secs: self.acquire_timeout,
            test_before_acquire: None,
        }
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, String> {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn close_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.close_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["flashcard-db"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--database", "cards", "card-sets"]);
        assert_eq!(config.server, "localhost");
        assert!(config.encrypt);
        assert!(config.trust_server_certificate);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
        assert!(matches!(config.command, Command::CardSets));
    }

    #[test]
    fn test_connection_config_from_discrete_settings() {
        let config = parse(&[
            "--db-type",
            "mysql",
            "--server",
            "db.internal",
            "--user",
            "app",
            "--password",
            "secret",
            "--database",
            "cards",
            "--encrypt",
            "false",
            "card-sets",
        ]);
        let conn = config.connection_config().unwrap();
        assert_eq!(conn.db_type(), DatabaseType::MySQL);
        assert_eq!(conn.server(), "db.internal");
        assert_eq!(conn.user(), Some("app"));
        assert_eq!(conn.password(), Some("secret"));
        assert!(!conn.encrypt());
        assert_eq!(conn.pool_name(), "pool-cards");
    }

    #[test]
    fn test_database_url_overrides_settings() {
        let config = parse(&[
            "--database-url",
            "sqlite:/tmp/cards.db",
            "--database",
            "ignored",
            "card-sets",
        ]);
        let conn = config.connection_config().unwrap();
        assert_eq!(conn.db_type(), DatabaseType::SQLite);
        assert_eq!(conn.database(), "/tmp/cards.db");
    }

    #[test]
    fn test_missing_database_is_error() {
        let config = parse(&["card-sets"]);
        assert!(matches!(
            config.connection_config(),
            Err(ConnectionConfigError::EmptyDatabase)
        ));
    }

    #[test]
    fn test_retry_policy_rejects_zero_attempts() {
        let config = parse(&["--database", "cards", "--max-retries", "0", "card-sets"]);
        assert!(config.retry_policy().is_err());
    }

    #[test]
    fn test_query_params_keep_types() {
        let config = parse(&[
            "--database",
            "cards",
            "query",
            "SELECT * FROM Cards WHERE Card_Set_ID = ? AND Card_Front = ?",
            "-p",
            "42",
            "-p",
            "hola",
        ]);
        match config.command {
            Command::Query { params, .. } => {
                assert!(matches!(params[0], QueryParam::Int(42)));
                assert!(matches!(&params[1], QueryParam::String(s) if s == "hola"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_pool_options_validation() {
        let opts = PoolOptions {
            min_connections: Some(10),
            max_connections: Some(5),
            ..PoolOptions::default()
        };
        let err = opts.validate().unwrap_err();
        assert!(err.contains("cannot exceed"));
        assert!(PoolOptions::default().validate().is_ok());
    }

    #[test]
    fn test_pool_options_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.max_connections_or_default(false), 10);
        assert_eq!(opts.max_connections_or_default(true), 1);
        assert_eq!(opts.min_connections_or_default(), 0);
        assert_eq!(opts.idle_timeout_or_default(), Duration::from_secs(600));
        assert_eq!(opts.acquire_timeout_or_default(), Duration::from_secs(30));
        assert!(opts.test_before_acquire_or_default());
    }

    #[test]
    fn test_pool_options_from_query_ignores_garbage() {
        let mut opts = HashMap::from([
            ("max_connections".to_string(), "abc".to_string()),
            ("test_before_acquire".to_string(), "yes".to_string()),
            ("idle_timeout".to_string(), "30".to_string()),
        ]);
        let parsed = PoolOptions::from_query(&mut opts);
        assert!(parsed.max_connections.is_none());
        assert!(parsed.test_before_acquire.is_none());
        assert_eq!(parsed.idle_timeout_secs, Some(30));
        assert!(opts.is_empty());
    }
}
