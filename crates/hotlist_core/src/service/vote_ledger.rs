//! Vote Ledger: at most one vote per `(actor, item)`.
//!
//! The ledger only records votes. Applying the score increment for an
//! accepted vote is the orchestrating caller's job.

use super::FeedResult;
use crate::model::key::ItemKey;
use crate::model::validation::ValidationError;
use crate::model::vote::{ItemRef, Vote};
use crate::repo::{FeedBackend, PutOutcome};
use log::{error, info};
use std::sync::Arc;
use std::time::Instant;

/// Result of recording a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First vote for this pair; caller must increment the score.
    Accepted,
    /// A vote already exists; score must not change.
    AlreadyVoted,
}

pub struct VoteLedger<B: FeedBackend + ?Sized> {
    backend: Arc<B>,
}

impl<B: FeedBackend + ?Sized> VoteLedger<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn record_vote(
        &self,
        actor: &str,
        category: &str,
        item_key: &ItemKey,
    ) -> FeedResult<VoteOutcome> {
        if actor.is_empty() {
            return Err(ValidationError::MissingActor.into());
        }

        let vote = Vote::new(actor, ItemRef::new(category, item_key));
        let started_at = Instant::now();
        let outcome = self.backend.put_vote_if_absent(&vote).await.map_err(|err| {
            error!(
                "event=vote_record module=vote_ledger status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            err
        })?;

        let outcome = match outcome {
            PutOutcome::Created => VoteOutcome::Accepted,
            PutOutcome::Conflict => VoteOutcome::AlreadyVoted,
        };
        info!(
            "event=vote_record module=vote_ledger status=ok outcome={:?} actor_len={} duration_ms={}",
            outcome,
            actor.len(),
            started_at.elapsed().as_millis()
        );
        Ok(outcome)
    }

    pub async fn has_voted(&self, actor: &str, item_ref: &ItemRef) -> FeedResult<bool> {
        Ok(self.backend.vote_exists(actor, item_ref).await?)
    }
}
