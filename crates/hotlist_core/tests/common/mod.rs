#![allow(dead_code)]

use async_trait::async_trait;
use hotlist_core::repo::memory::MemoryBackend;
use hotlist_core::{
    BackendError, BackendResult, EngineConfig, FeedBackend, FeedService, Item, ItemKey, ItemRef,
    Payload, PutOutcome, ScoreQuery, Vote,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Memory backend with switchable faults for failure-path tests.
#[derive(Default)]
pub struct FaultyBackend {
    inner: MemoryBackend,
    fail_vote_lookups: AtomicBool,
    vote_lookup_delay: Mutex<Option<Duration>>,
    /// Number of upcoming `add_to_score` calls refused before writing.
    rejected_increments: AtomicU32,
    /// Next `add_to_score` writes, then reports a failure.
    lose_increment_response: AtomicBool,
    increment_calls: AtomicU32,
    fail_votes_for: Mutex<Option<ItemKey>>,
}

impl FaultyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_vote_lookups(&self, enabled: bool) {
        self.fail_vote_lookups.store(enabled, Ordering::SeqCst);
    }

    /// Fails lookups for one item only.
    pub fn fail_vote_lookups_for(&self, key: ItemKey) {
        *self.fail_votes_for.lock() = Some(key);
    }

    pub fn delay_vote_lookups(&self, delay: Duration) {
        *self.vote_lookup_delay.lock() = Some(delay);
    }

    pub fn reject_next_increments(&self, count: u32) {
        self.rejected_increments.store(count, Ordering::SeqCst);
    }

    /// Applies the next increment but answers with an error, as a timed-out
    /// remote write would.
    pub fn lose_next_increment_response(&self) {
        self.lose_increment_response.store(true, Ordering::SeqCst);
    }

    pub fn increment_calls(&self) -> u32 {
        self.increment_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedBackend for FaultyBackend {
    async fn put_item_if_absent(&self, item: &Item) -> BackendResult<PutOutcome> {
        self.inner.put_item_if_absent(item).await
    }

    async fn get_item(&self, category: &str, key: &ItemKey) -> BackendResult<Option<Item>> {
        self.inner.get_item(category, key).await
    }

    async fn add_to_score(
        &self,
        category: &str,
        key: &ItemKey,
        delta: u64,
    ) -> BackendResult<Item> {
        self.increment_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.rejected_increments.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rejected_increments.store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::Rejected("injected throttle".to_string()));
        }
        let updated = self.inner.add_to_score(category, key, delta).await?;
        if self.lose_increment_response.swap(false, Ordering::SeqCst) {
            return Err(BackendError::Service("injected response timeout".to_string()));
        }
        Ok(updated)
    }

    async fn set_score(&self, category: &str, key: &ItemKey, score: u64) -> BackendResult<()> {
        self.inner.set_score(category, key, score).await
    }

    async fn query_by_score(&self, query: &ScoreQuery) -> BackendResult<Vec<Item>> {
        self.inner.query_by_score(query).await
    }

    async fn put_vote_if_absent(&self, vote: &Vote) -> BackendResult<PutOutcome> {
        self.inner.put_vote_if_absent(vote).await
    }

    async fn vote_exists(&self, actor: &str, item_ref: &ItemRef) -> BackendResult<bool> {
        let delay = *self.vote_lookup_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_vote_lookups.load(Ordering::SeqCst) {
            return Err(BackendError::Service("injected lookup failure".to_string()));
        }
        let failing_key = *self.fail_votes_for.lock();
        if let Some(key) = failing_key {
            if ItemRef::new("gif", &key) == *item_ref {
                return Err(BackendError::Service("injected lookup failure".to_string()));
            }
        }
        self.inner.vote_exists(actor, item_ref).await
    }

    async fn count_votes(&self, item_ref: &ItemRef) -> BackendResult<u64> {
        self.inner.count_votes(item_ref).await
    }
}

pub fn memory_service() -> (Arc<MemoryBackend>, FeedService<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let service = FeedService::new(Arc::clone(&backend), &EngineConfig::default());
    (backend, service)
}

pub fn payload(name: &str) -> Payload {
    Payload::new(format!("http://img.example/{name}.gif"))
}

/// Creates an item under a fixed key so ordering is predictable.
pub async fn seed_item<B: FeedBackend + ?Sized + 'static>(
    service: &FeedService<B>,
    nanos: u64,
) -> Item {
    service
        .item_store()
        .create_item_with_key(
            service.category(),
            ItemKey::from_nanos(nanos),
            payload(&nanos.to_string()),
        )
        .await
        .unwrap()
}

/// Casts one vote per generated actor.
pub async fn cast_votes<B: FeedBackend + ?Sized + 'static>(
    service: &FeedService<B>,
    key: ItemKey,
    count: usize,
) {
    for voter in 0..count {
        let request = hotlist_core::VoteRequest {
            actor: format!("device-{voter}"),
            key,
        };
        service.vote(&request).await.unwrap();
    }
}
