//! Flashcard database core.
//!
//! A registry of named connection pools, parameterized query execution with
//! backend-native placeholders, and a deadlock-aware retrying executor, plus
//! the typed flashcard operations built on top of them. Supports SQLite,
//! PostgreSQL and MySQL.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use config::Config;
pub use db::{PoolRegistry, RetryPolicy, RetryingExecutor};
pub use error::{DbError, DbResult};
pub use store::CardStore;
