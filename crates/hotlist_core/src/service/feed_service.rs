//! Feed service: orchestrates the four feed components per request.
//!
//! # Responsibility
//! - Create: Item Store only.
//! - Vote: Vote Ledger, then on first acceptance the score increment.
//! - List: Ranked Query, then Vote Annotator when an actor is present.
//!
//! # Invariants
//! - An accepted vote either returns the incremented item or a
//!   `ScoreNotApplied` error; a failed increment is never reported as success.
//! - An increment is resent only when the backend proves it wrote nothing,
//!   so a vote never adds more than one point.
//! - `Reconciler` settles the scores left behind by `ScoreNotApplied`.

use super::item_store::ItemStore;
use super::ranked_query::RankedQuery;
use super::vote_annotator::VoteAnnotator;
use super::vote_ledger::{VoteLedger, VoteOutcome};
use super::{FeedError, FeedResult};
use crate::config::EngineConfig;
use crate::model::cursor::{Cursor, Direction};
use crate::model::item::{AnnotatedItem, Item, Payload};
use crate::model::key::ItemKey;
use crate::model::validation::ValidationError;
use crate::model::vote::ItemRef;
use crate::repo::{BackendError, FeedBackend};
use log::{error, warn};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItemRequest {
    pub payload: Payload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Absent for the first page.
    pub cursor: Option<Cursor>,
    pub direction: Direction,
    /// Absent or zero means the configured default page size.
    pub limit: Option<u32>,
    /// Requesting actor; empty skips annotation.
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRequest {
    pub actor: String,
    pub key: ItemKey,
}

/// Ranked page enriched with the actor's vote flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedPage {
    pub items: Vec<AnnotatedItem>,
    pub next_cursor: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteResult {
    /// Vote recorded; the item reflects the increment.
    Accepted(AnnotatedItem),
    AlreadyVoted,
}

pub struct FeedService<B: FeedBackend + ?Sized> {
    category: String,
    items: ItemStore<B>,
    ledger: Arc<VoteLedger<B>>,
    ranked: RankedQuery<B>,
    annotator: VoteAnnotator<B>,
    increment_attempts: u32,
}

impl<B: FeedBackend + ?Sized + 'static> FeedService<B> {
    pub fn new(backend: Arc<B>, config: &EngineConfig) -> Self {
        let ledger = Arc::new(VoteLedger::new(Arc::clone(&backend)));
        Self {
            category: config.category.clone(),
            items: ItemStore::new(Arc::clone(&backend)),
            ranked: RankedQuery::new(
                Arc::clone(&backend),
                config.default_page_size,
                config.max_page_size,
            ),
            annotator: VoteAnnotator::new(
                Arc::clone(&ledger),
                config.annotation_timeout,
                config.annotation_concurrency,
            ),
            ledger,
            increment_attempts: config.increment_attempts.max(1),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn item_store(&self) -> &ItemStore<B> {
        &self.items
    }

    pub fn vote_ledger(&self) -> &VoteLedger<B> {
        &self.ledger
    }

    pub async fn create_item(&self, request: CreateItemRequest) -> FeedResult<Item> {
        self.items.create_item(&self.category, request.payload).await
    }

    pub async fn list_ranked(&self, request: &ListRequest) -> FeedResult<AnnotatedPage> {
        let page = self
            .ranked
            .query(
                &self.category,
                request.cursor.as_ref(),
                request.direction,
                request.limit,
            )
            .await?;
        let items = self.annotator.annotate(page.items, &request.actor).await;
        Ok(AnnotatedPage {
            items,
            next_cursor: page.next_cursor,
        })
    }

    pub async fn vote(&self, request: &VoteRequest) -> FeedResult<VoteResult> {
        if request.actor.is_empty() {
            return Err(ValidationError::MissingActor.into());
        }
        if self
            .items
            .get_item(&self.category, &request.key)
            .await?
            .is_none()
        {
            return Err(FeedError::UnknownItem {
                category: self.category.clone(),
                key: request.key,
            });
        }

        match self
            .ledger
            .record_vote(&request.actor, &self.category, &request.key)
            .await?
        {
            VoteOutcome::AlreadyVoted => Ok(VoteResult::AlreadyVoted),
            VoteOutcome::Accepted => {
                let item = self.apply_vote_increment(&request.key).await?;
                Ok(VoteResult::Accepted(AnnotatedItem::new(item, true)))
            }
        }
    }

    /// Adds the accepted vote to the item's score.
    ///
    /// Only `Rejected` failures are resent; any other error may hide an add
    /// that already landed, and resending it would overcount.
    async fn apply_vote_increment(&self, key: &ItemKey) -> FeedResult<Item> {
        let mut attempt = 1;
        let source = loop {
            let err = match self.items.increment_score(&self.category, key, 1).await {
                Ok(item) => return Ok(item),
                Err(FeedError::Backend(err)) => err,
                Err(other) => return Err(other),
            };
            if !matches!(err, BackendError::Rejected(_)) || attempt >= self.increment_attempts {
                break err;
            }
            warn!(
                "event=vote_increment module=feed_service status=retry attempt={attempt} max_attempts={}",
                self.increment_attempts
            );
            attempt += 1;
        };

        error!(
            "event=vote_increment module=feed_service status=error error_code=score_not_applied key={key} attempts={attempt} unapplied={} error={source}",
            source.is_unapplied()
        );
        Err(FeedError::ScoreNotApplied {
            item_ref: ItemRef::new(&self.category, key),
            attempts: attempt,
            source,
        })
    }
}
