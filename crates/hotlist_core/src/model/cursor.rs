//! Keyset pagination cursors.
//!
//! # Invariants
//! - Ranking uses the total order `(score, key)`; descending scans walk it
//!   backwards, ascending scans forwards.
//! - A cursor is an exclusive position in that order: the item it was built
//!   from is never returned again by a query starting after it.

use super::item::Item;
use super::key::{ItemKey, ITEM_KEY_LEN};
use super::validation::ValidationError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

const SCORE_LEN: usize = 8;

/// Scan direction over the score index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Highest score first. Default feed order.
    #[default]
    Descending,
    /// Lowest score first; pages back toward higher scores from a cursor.
    Ascending,
}

/// Last-seen position on a ranked page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub category: String,
    pub score: u64,
    pub key: ItemKey,
}

impl Cursor {
    pub fn new(category: impl Into<String>, score: u64, key: ItemKey) -> Self {
        Self {
            category: category.into(),
            score,
            key,
        }
    }

    /// Cursor positioned on `item`, for fetching the page after it.
    pub fn after(item: &Item) -> Self {
        Self::new(item.category.clone(), item.score, item.key)
    }

    /// Encodes the cursor as URL-safe base64 of `score || key || category`.
    pub fn to_token(&self) -> String {
        let mut bytes = Vec::with_capacity(SCORE_LEN + ITEM_KEY_LEN + self.category.len());
        bytes.extend_from_slice(&self.score.to_be_bytes());
        bytes.extend_from_slice(self.key.as_bytes());
        bytes.extend_from_slice(self.category.as_bytes());
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn from_token(token: &str) -> Result<Self, ValidationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| ValidationError::InvalidCursorToken)?;
        if bytes.len() <= SCORE_LEN + ITEM_KEY_LEN {
            return Err(ValidationError::InvalidCursorToken);
        }

        let (score_bytes, rest) = bytes.split_at(SCORE_LEN);
        let (key_bytes, category_bytes) = rest.split_at(ITEM_KEY_LEN);
        let score = u64::from_be_bytes(
            score_bytes
                .try_into()
                .map_err(|_| ValidationError::InvalidCursorToken)?,
        );
        let key = ItemKey::from_slice(key_bytes).map_err(|_| ValidationError::InvalidCursorToken)?;
        let category = std::str::from_utf8(category_bytes)
            .map_err(|_| ValidationError::InvalidCursorToken)?;

        Ok(Self::new(category, score, key))
    }
}

#[cfg(test)]
mod tests {
    use super::Cursor;
    use crate::model::key::ItemKey;
    use crate::model::validation::ValidationError;

    #[test]
    fn token_carries_category_score_and_key() {
        let cursor = Cursor::new("gif", 42, ItemKey::from_nanos(99));
        let decoded = Cursor::from_token(&cursor.to_token()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn truncated_token_is_rejected() {
        assert_eq!(
            Cursor::from_token("AAAA").unwrap_err(),
            ValidationError::InvalidCursorToken
        );
        assert_eq!(
            Cursor::from_token("%%%").unwrap_err(),
            ValidationError::InvalidCursorToken
        );
    }
}
