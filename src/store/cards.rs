use super::{CardStore, INSERT_BATCH_SIZE, decode_rows};
use crate::error::DbResult;
use crate::models::{Card, CardUpdate, NewCard, Query};
use tracing::{debug, error};

impl CardStore {
    pub async fn create_card(&self, card: &NewCard) -> DbResult<()> {
        let query = Query::new(
            "INSERT INTO Cards (Card_Set_ID, Card_Front, Card_Back) VALUES (@param0, @param1, @param2)",
        )
        .bind(card.card_set_id)
        .bind(card.front.as_str())
        .bind(card.back.as_str());
        self.executor.execute(&query).await.map(|_| ()).inspect_err(|e| {
            error!(error = %e, card_set_id = card.card_set_id, "Failed to create card");
        })
    }

    /// Insert many cards with multi-row INSERTs of up to [`INSERT_BATCH_SIZE`]
    /// rows each. Returns the number of rows inserted.
    ///
    /// Batches are not wrapped in a transaction; a failure leaves earlier
    /// batches in place.
    pub async fn create_cards(&self, cards: &[NewCard]) -> DbResult<u64> {
        let mut inserted = 0;
        for batch in cards.chunks(INSERT_BATCH_SIZE) {
            let query = insert_cards_query(batch);
            let affected = self.executor.execute(&query).await.inspect_err(|e| {
                error!(error = %e, batch_size = batch.len(), inserted, "Failed to create cards");
            })?;
            inserted += affected;
        }
        debug!(inserted, "Created cards");
        Ok(inserted)
    }

    pub async fn list_cards(&self, card_set_id: i64) -> DbResult<Vec<Card>> {
        let query = Query::new(
            r#"SELECT ID AS "ID", Card_Set_ID AS "Card_Set_ID", Card_Front AS "Card_Front", Card_Back AS "Card_Back" FROM Cards WHERE Card_Set_ID = @param0 ORDER BY ID"#,
        )
        .bind(card_set_id);
        let result = self.executor.query(&query).await.inspect_err(|e| {
            error!(error = %e, card_set_id, "Failed to list cards");
        })?;
        decode_rows(&result)
    }

    /// Returns the number of cards changed, 0 when the id does not exist.
    pub async fn update_card(&self, update: &CardUpdate) -> DbResult<u64> {
        let query = Query::new(
            "UPDATE Cards SET Card_Front = @param0, Card_Back = @param1 WHERE ID = @param2",
        )
        .bind(update.front.as_str())
        .bind(update.back.as_str())
        .bind(update.id);
        self.executor.execute(&query).await.inspect_err(|e| {
            error!(error = %e, card_id = update.id, "Failed to update card");
        })
    }

    pub async fn delete_card(&self, id: i64) -> DbResult<u64> {
        let query = Query::new("DELETE FROM Cards WHERE ID = @param0").bind(id);
        self.executor.execute(&query).await.inspect_err(|e| {
            error!(error = %e, card_id = id, "Failed to delete card");
        })
    }
}

fn insert_cards_query(batch: &[NewCard]) -> Query {
    let rows = vec!["(?, ?, ?)"; batch.len()].join(", ");
    let mut query = Query::new(format!(
        "INSERT INTO Cards (Card_Set_ID, Card_Front, Card_Back) VALUES {rows}"
    ));
    for card in batch {
        query = query
            .bind(card.card_set_id)
            .bind(card.front.as_str())
            .bind(card.back.as_str());
    }
    query
}
