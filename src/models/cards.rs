//! Flashcard records as stored in the `Card_Sets` and `Cards` tables.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSet {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Card_Set_Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Card_Set_ID")]
    pub card_set_id: i64,
    #[serde(rename = "Card_Front")]
    pub front: String,
    #[serde(rename = "Card_Back")]
    pub back: String,
}

/// A card that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCard {
    pub card_set_id: i64,
    pub front: String,
    pub back: String,
}

impl NewCard {
    pub fn new(card_set_id: i64, front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            card_set_id,
            front: front.into(),
            back: back.into(),
        }
    }
}

/// New text for an existing card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardUpdate {
    pub id: i64,
    pub front: String,
    pub back: String,
}
