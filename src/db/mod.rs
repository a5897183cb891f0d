//! Database access layer.
//!
//! - Named pool registry with single-flight creation
//! - Placeholder rewriting and parameter binding
//! - Query execution and row decoding
//! - Deadlock-aware retries

pub mod executor;
pub mod params;
pub mod placeholders;
pub mod pool;
pub mod registry;
pub mod retry;
pub mod types;

pub use executor::QueryExecutor;
pub use placeholders::{PreparedSql, prepare_sql};
pub use pool::{DbPool, Pool, Request};
pub use registry::PoolRegistry;
pub use retry::{RetryPolicy, RetryingExecutor, retry_on_deadlock};
