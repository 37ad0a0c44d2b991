//! In-process feed backend.
//!
//! Keeps items, the score index and votes in `parking_lot::RwLock`-guarded
//! maps. Every trait call takes the lock once, so conditional puts and score
//! adds are atomic with respect to each other.

use super::{BackendError, BackendResult, FeedBackend, PutOutcome, ScoreQuery};
use crate::model::cursor::Direction;
use crate::model::item::Item;
use crate::model::key::ItemKey;
use crate::model::vote::{ItemRef, Vote};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Debug;
use std::ops::Bound;
use std::sync::Arc;

type ItemId = (String, ItemKey);
type IndexEntry = (String, u64, ItemKey);

#[derive(Default)]
struct MemoryState {
    items: BTreeMap<ItemId, Item>,
    score_index: BTreeSet<IndexEntry>,
    votes: HashSet<(String, ItemRef)>,
}

impl MemoryState {
    fn reindex(&mut self, item: &Item, old_score: u64) {
        self.score_index.remove(&(item.category.clone(), old_score, item.key));
        self.score_index.insert((item.category.clone(), item.score, item.key));
    }
}

/// Memory-backed store. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryBackend")
            .field("item_count", &state.items.len())
            .field("vote_count", &state.votes.len())
            .finish()
    }
}

fn not_found(category: &str, key: &ItemKey) -> BackendError {
    BackendError::NotFound {
        category: category.to_string(),
        key: *key,
    }
}

#[async_trait]
impl FeedBackend for MemoryBackend {
    async fn put_item_if_absent(&self, item: &Item) -> BackendResult<PutOutcome> {
        let mut state = self.state.write();
        let id = (item.category.clone(), item.key);
        if state.items.contains_key(&id) {
            return Ok(PutOutcome::Conflict);
        }
        state
            .score_index
            .insert((item.category.clone(), item.score, item.key));
        state.items.insert(id, item.clone());
        Ok(PutOutcome::Created)
    }

    async fn get_item(&self, category: &str, key: &ItemKey) -> BackendResult<Option<Item>> {
        let state = self.state.read();
        Ok(state.items.get(&(category.to_string(), *key)).cloned())
    }

    async fn add_to_score(
        &self,
        category: &str,
        key: &ItemKey,
        delta: u64,
    ) -> BackendResult<Item> {
        let mut state = self.state.write();
        let item = state
            .items
            .get_mut(&(category.to_string(), *key))
            .ok_or_else(|| not_found(category, key))?;
        let old_score = item.score;
        item.score = old_score.checked_add(delta).ok_or_else(|| {
            BackendError::InvalidData(format!("score overflow on {category}/{key}"))
        })?;
        let updated = item.clone();
        state.reindex(&updated, old_score);
        Ok(updated)
    }

    async fn set_score(&self, category: &str, key: &ItemKey, score: u64) -> BackendResult<()> {
        let mut state = self.state.write();
        let item = state
            .items
            .get_mut(&(category.to_string(), *key))
            .ok_or_else(|| not_found(category, key))?;
        let old_score = item.score;
        item.score = score;
        let updated = item.clone();
        state.reindex(&updated, old_score);
        Ok(())
    }

    async fn query_by_score(&self, query: &ScoreQuery) -> BackendResult<Vec<Item>> {
        let state = self.state.read();
        let category = &query.category;
        let limit = query.limit as usize;

        let floor = (category.clone(), 0, ItemKey::MIN);
        let ceiling = (category.clone(), u64::MAX, ItemKey::MAX);
        let start = query
            .start_after
            .as_ref()
            .map(|cursor| (category.clone(), cursor.score, cursor.key));

        let entries: Vec<&IndexEntry> = match query.direction {
            Direction::Descending => {
                let upper = start.map_or(Bound::Included(ceiling), Bound::Excluded);
                state
                    .score_index
                    .range((Bound::Included(floor), upper))
                    .rev()
                    .take(limit)
                    .collect()
            }
            Direction::Ascending => {
                let lower = start.map_or(Bound::Included(floor), Bound::Excluded);
                state
                    .score_index
                    .range((lower, Bound::Included(ceiling)))
                    .take(limit)
                    .collect()
            }
        };

        entries
            .into_iter()
            .map(|(category, _, key)| {
                state
                    .items
                    .get(&(category.clone(), *key))
                    .cloned()
                    .ok_or_else(|| {
                        BackendError::InvalidData(format!(
                            "score index references missing item {category}/{key}"
                        ))
                    })
            })
            .collect()
    }

    async fn put_vote_if_absent(&self, vote: &Vote) -> BackendResult<PutOutcome> {
        let mut state = self.state.write();
        if state.votes.insert((vote.actor.clone(), vote.item_ref.clone())) {
            Ok(PutOutcome::Created)
        } else {
            Ok(PutOutcome::Conflict)
        }
    }

    async fn vote_exists(&self, actor: &str, item_ref: &ItemRef) -> BackendResult<bool> {
        let state = self.state.read();
        Ok(state.votes.contains(&(actor.to_string(), item_ref.clone())))
    }

    async fn count_votes(&self, item_ref: &ItemRef) -> BackendResult<u64> {
        let state = self.state.read();
        Ok(state
            .votes
            .iter()
            .filter(|(_, voted)| voted == item_ref)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryBackend;
    use crate::model::cursor::{Cursor, Direction};
    use crate::model::item::{Item, Payload};
    use crate::model::key::ItemKey;
    use crate::repo::{BackendError, FeedBackend, PutOutcome, ScoreQuery};

    fn item(nanos: u64) -> Item {
        Item::new("gif", ItemKey::from_nanos(nanos), Payload::new("http://x/y.gif"))
    }

    #[tokio::test]
    async fn conditional_put_rejects_existing_key() {
        let backend = MemoryBackend::new();
        assert_eq!(
            backend.put_item_if_absent(&item(1)).await.unwrap(),
            PutOutcome::Created
        );
        assert_eq!(
            backend.put_item_if_absent(&item(1)).await.unwrap(),
            PutOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn score_add_moves_item_in_index() {
        let backend = MemoryBackend::new();
        backend.put_item_if_absent(&item(1)).await.unwrap();
        backend.put_item_if_absent(&item(2)).await.unwrap();
        backend
            .add_to_score("gif", &ItemKey::from_nanos(1), 3)
            .await
            .unwrap();

        let page = backend
            .query_by_score(&ScoreQuery::first_page("gif", 10))
            .await
            .unwrap();
        let keys: Vec<u64> = page.iter().map(|item| item.key.as_nanos()).collect();
        assert_eq!(keys, vec![1, 2]);
        assert_eq!(page[0].score, 3);
    }

    #[tokio::test]
    async fn score_add_on_missing_item_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend
            .add_to_score("gif", &ItemKey::from_nanos(9), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[tokio::test]
    async fn ascending_scan_starts_after_cursor() {
        let backend = MemoryBackend::new();
        for nanos in 1..=3 {
            backend.put_item_if_absent(&item(nanos)).await.unwrap();
        }
        let query = ScoreQuery {
            category: "gif".to_string(),
            start_after: Some(Cursor::new("gif", 0, ItemKey::from_nanos(1))),
            direction: Direction::Ascending,
            limit: 10,
        };
        let page = backend.query_by_score(&query).await.unwrap();
        let keys: Vec<u64> = page.iter().map(|item| item.key.as_nanos()).collect();
        assert_eq!(keys, vec![2, 3]);
    }

    #[tokio::test]
    async fn scans_never_cross_categories() {
        let backend = MemoryBackend::new();
        backend.put_item_if_absent(&item(1)).await.unwrap();
        let other = Item::new("png", ItemKey::from_nanos(2), Payload::new("http://x/z.png"));
        backend.put_item_if_absent(&other).await.unwrap();

        let page = backend
            .query_by_score(&ScoreQuery::first_page("png", 10))
            .await
            .unwrap();
        assert_eq!(page, vec![other]);
    }
}
