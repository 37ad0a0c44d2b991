//! Feed item model.
//!
//! # Invariants
//! - `payload` is immutable after creation.
//! - `score` starts at zero and only moves through atomic increments.

use super::key::ItemKey;
use super::validation::ValidationError;
use super::vote::ItemRef;
use serde::{Deserialize, Serialize};

/// External resource an item points at, plus an optional caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Payload {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            caption: None,
        }
    }

    /// Attaches a caption; blank captions are treated as absent.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        let caption = caption.into();
        self.caption = if caption.trim().is_empty() {
            None
        } else {
            Some(caption)
        };
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        Ok(())
    }
}

/// One ranked feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub category: String,
    pub key: ItemKey,
    pub score: u64,
    pub payload: Payload,
}

impl Item {
    /// Creates a fresh item with `score = 0`.
    pub fn new(category: impl Into<String>, key: ItemKey, payload: Payload) -> Self {
        Self {
            category: category.into(),
            key,
            score: 0,
            payload,
        }
    }

    /// Composite reference used by the vote ledger.
    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(&self.category, &self.key)
    }
}

/// An item paired with the requesting actor's vote status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedItem {
    pub item: Item,
    pub has_voted: bool,
}

impl AnnotatedItem {
    pub fn new(item: Item, has_voted: bool) -> Self {
        Self { item, has_voted }
    }
}
