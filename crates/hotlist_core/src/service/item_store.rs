//! Item Store: immutable item creation and score increments.
//!
//! # Invariants
//! - Keys come from one `KeyGenerator` per store, strictly increasing.
//! - A key collision is reported as `DuplicateKey` and never retried with a
//!   fresh key.

use super::{FeedError, FeedResult};
use crate::model::item::{Item, Payload};
use crate::model::key::{ItemKey, KeyGenerator};
use crate::repo::{FeedBackend, PutOutcome};
use log::{error, info};
use std::sync::Arc;
use std::time::Instant;

pub struct ItemStore<B: FeedBackend + ?Sized> {
    backend: Arc<B>,
    keys: KeyGenerator,
}

impl<B: FeedBackend + ?Sized> ItemStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            keys: KeyGenerator::new(),
        }
    }

    /// Creates an item under a freshly generated key.
    pub async fn create_item(&self, category: &str, payload: Payload) -> FeedResult<Item> {
        let key = self.keys.next_key();
        self.create_item_with_key(category, key, payload).await
    }

    /// Creates an item under a caller-chosen key.
    ///
    /// Used by imports and tests; collisions surface as `DuplicateKey`.
    pub async fn create_item_with_key(
        &self,
        category: &str,
        key: ItemKey,
        payload: Payload,
    ) -> FeedResult<Item> {
        payload.validate()?;
        let item = Item::new(category, key, payload);
        let started_at = Instant::now();

        match self.backend.put_item_if_absent(&item).await {
            Ok(PutOutcome::Created) => {
                info!(
                    "event=item_create module=item_store status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(item)
            }
            Ok(PutOutcome::Conflict) => {
                error!(
                    "event=item_create module=item_store status=error error_code=duplicate_key key={}",
                    item.key
                );
                Err(FeedError::DuplicateKey {
                    category: item.category,
                    key: item.key,
                })
            }
            Err(err) => {
                error!(
                    "event=item_create module=item_store status=error duration_ms={} error_code=backend_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Atomically adds `delta` to the item's score and returns the new state.
    ///
    /// A missing item is a backend error, not a silent no-op.
    pub async fn increment_score(
        &self,
        category: &str,
        key: &ItemKey,
        delta: u64,
    ) -> FeedResult<Item> {
        self.backend
            .add_to_score(category, key, delta)
            .await
            .map_err(|err| {
                error!(
                    "event=score_increment module=item_store status=error key={key} error={err}"
                );
                FeedError::from(err)
            })
    }

    pub async fn get_item(&self, category: &str, key: &ItemKey) -> FeedResult<Option<Item>> {
        Ok(self.backend.get_item(category, key).await?)
    }
}
