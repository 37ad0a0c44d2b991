//! Vote Annotator: per-item "has this actor voted" flags for a page.
//!
//! # Invariants
//! - Output order equals input order.
//! - Lookups are fail-open: an error or timeout yields `has_voted = false`
//!   and is logged, never propagated.
//! - At most `concurrency` lookups are in flight; all of them are joined (or
//!   aborted) before `annotate` returns.

use super::vote_ledger::VoteLedger;
use crate::model::item::{AnnotatedItem, Item};
use crate::repo::FeedBackend;
use log::warn;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct VoteAnnotator<B: FeedBackend + ?Sized> {
    ledger: Arc<VoteLedger<B>>,
    lookup_timeout: Duration,
    concurrency: usize,
}

impl<B: FeedBackend + ?Sized + 'static> VoteAnnotator<B> {
    pub fn new(ledger: Arc<VoteLedger<B>>, lookup_timeout: Duration, concurrency: usize) -> Self {
        Self {
            ledger,
            lookup_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Marks which `items` `actor` has voted on. An empty actor marks none.
    pub async fn annotate(&self, items: Vec<Item>, actor: &str) -> Vec<AnnotatedItem> {
        if actor.is_empty() || items.is_empty() {
            return items
                .into_iter()
                .map(|item| AnnotatedItem::new(item, false))
                .collect();
        }

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut lookups = JoinSet::new();
        for (index, item) in items.iter().enumerate() {
            let ledger = Arc::clone(&self.ledger);
            let permits = Arc::clone(&permits);
            let actor = actor.to_string();
            let item_ref = item.item_ref();
            let lookup_timeout = self.lookup_timeout;

            lookups.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (index, false);
                };
                let voted =
                    match tokio::time::timeout(lookup_timeout, ledger.has_voted(&actor, &item_ref))
                        .await
                    {
                        Ok(Ok(voted)) => voted,
                        Ok(Err(err)) => {
                            warn!(
                                "event=vote_lookup module=vote_annotator status=error error_code=lookup_failed index={index} error={err}"
                            );
                            false
                        }
                        Err(_) => {
                            warn!(
                                "event=vote_lookup module=vote_annotator status=error error_code=lookup_timeout index={index} timeout_ms={}",
                                lookup_timeout.as_millis()
                            );
                            false
                        }
                    };
                (index, voted)
            });
        }

        let mut flags = vec![false; items.len()];
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((index, voted)) => flags[index] = voted,
                Err(err) => warn!(
                    "event=vote_lookup module=vote_annotator status=error error_code=task_failed error={err}"
                ),
            }
        }

        items
            .into_iter()
            .zip(flags)
            .map(|(item, has_voted)| AnnotatedItem::new(item, has_voted))
            .collect()
    }
}
