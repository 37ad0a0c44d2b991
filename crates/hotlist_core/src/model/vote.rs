//! Vote ledger model.

use super::key::ItemKey;

/// `category || 0x00 || key`, the item half of a vote's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemRef(Vec<u8>);

impl ItemRef {
    pub fn new(category: &str, key: &ItemKey) -> Self {
        let mut bytes = Vec::with_capacity(category.len() + 1 + key.as_bytes().len());
        bytes.extend_from_slice(category.as_bytes());
        bytes.push(0x00);
        bytes.extend_from_slice(key.as_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// One accepted vote. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub actor: String,
    pub item_ref: ItemRef,
}

impl Vote {
    pub fn new(actor: impl Into<String>, item_ref: ItemRef) -> Self {
        Self {
            actor: actor.into(),
            item_ref,
        }
    }
}
