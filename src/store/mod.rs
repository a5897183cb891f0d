//! Typed flashcard operations over the retrying executor.
//!
//! Tables:
//!
//! - `Card_Sets(ID, Card_Set_Name)`
//! - `Cards(ID, Card_Set_ID, Card_Front, Card_Back)`
//!
//! Columns are selected with quoted aliases so rows decode the same way on
//! every backend, whatever case the server folds identifiers to.

mod card_sets;
mod cards;

use crate::db::RetryingExecutor;
use crate::error::{DbError, DbResult};
use crate::models::QueryResult;
use serde::de::DeserializeOwned;

/// Cards per INSERT statement in [`CardStore::create_cards`].
pub const INSERT_BATCH_SIZE: usize = 300;

#[derive(Debug, Clone)]
pub struct CardStore {
    executor: RetryingExecutor,
}

impl CardStore {
    pub fn new(executor: RetryingExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &RetryingExecutor {
        &self.executor
    }
}

fn decode_rows<T: DeserializeOwned>(result: &QueryResult) -> DbResult<Vec<T>> {
    result
        .decode()
        .map_err(|e| DbError::internal(format!("Unexpected row shape: {}", e)))
}
