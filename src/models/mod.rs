//! Data models for the flashcard database core.
//!
//! This module re-exports all model types used throughout the crate.

pub mod cards;
pub mod connection;
pub mod query;

// Re-export commonly used types
pub use cards::{Card, CardSet, CardUpdate, NewCard};
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use query::{Query, QueryParam, QueryResult, Row};
