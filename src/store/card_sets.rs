use super::{CardStore, decode_rows};
use crate::error::DbResult;
use crate::models::{CardSet, Query};
use tracing::error;

const SELECT_CARD_SETS: &str = r#"SELECT ID AS "ID", Card_Set_Name AS "Card_Set_Name" FROM Card_Sets"#;

impl CardStore {
    pub async fn create_card_set(&self, name: &str) -> DbResult<()> {
        let query = Query::new("INSERT INTO Card_Sets (Card_Set_Name) VALUES (@param0)").bind(name);
        self.executor.execute(&query).await.map(|_| ()).inspect_err(|e| {
            error!(error = %e, card_set = %name, "Failed to create card set");
        })
    }

    pub async fn list_card_sets(&self) -> DbResult<Vec<CardSet>> {
        let query = Query::new(format!("{SELECT_CARD_SETS} ORDER BY ID"));
        let result = self.executor.query(&query).await.inspect_err(|e| {
            error!(error = %e, "Failed to list card sets");
        })?;
        decode_rows(&result)
    }

    /// `None` when no set has this id.
    pub async fn get_card_set(&self, id: i64) -> DbResult<Option<CardSet>> {
        let query = Query::new(format!("{SELECT_CARD_SETS} WHERE ID = @param0")).bind(id);
        let result = self.executor.query(&query).await.inspect_err(|e| {
            error!(error = %e, card_set_id = id, "Failed to get card set");
        })?;
        Ok(decode_rows(&result)?.into_iter().next())
    }
}
