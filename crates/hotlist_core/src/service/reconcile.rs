//! Score reconciliation.
//!
//! Recording a vote and incrementing the score are two backend calls. When
//! the second one is lost (process crash, persistent backend failure) the
//! item is left undercounted. `Reconciler` restores `score == vote count` for
//! every item in a category; run it periodically or after a
//! `ScoreNotApplied` error to make scores eventually consistent.
//!
//! A vote landing between the recount and the overwrite of the same item can
//! be lost again; the next pass picks it up.

use super::FeedResult;
use crate::model::cursor::Cursor;
use crate::model::item::Item;
use crate::repo::{FeedBackend, ScoreQuery};
use log::info;
use std::sync::Arc;
use std::time::Instant;

const RECONCILE_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: u64,
    pub repaired: u64,
}

pub struct Reconciler<B: FeedBackend + ?Sized> {
    backend: Arc<B>,
    page_size: u32,
}

impl<B: FeedBackend + ?Sized> Reconciler<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            page_size: RECONCILE_PAGE_SIZE,
        }
    }

    pub async fn reconcile(&self, category: &str) -> FeedResult<ReconcileReport> {
        let started_at = Instant::now();
        // Collect first: repairing moves items in the index being walked.
        let items = self.collect_items(category).await?;
        let mut report = ReconcileReport::default();

        for item in items {
            report.scanned += 1;
            let votes = self.backend.count_votes(&item.item_ref()).await?;
            if votes != item.score {
                self.backend
                    .set_score(&item.category, &item.key, votes)
                    .await?;
                info!(
                    "event=score_repair module=reconcile status=ok key={} stored={} counted={}",
                    item.key, item.score, votes
                );
                report.repaired += 1;
            }
        }

        info!(
            "event=reconcile module=reconcile status=ok scanned={} repaired={} duration_ms={}",
            report.scanned,
            report.repaired,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    async fn collect_items(&self, category: &str) -> FeedResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut query = ScoreQuery::first_page(category, self.page_size);

        loop {
            let page = self.backend.query_by_score(&query).await?;
            let full_page = page.len() == self.page_size as usize;
            query.start_after = page.last().map(Cursor::after);
            items.extend(page);
            if !full_page {
                return Ok(items);
            }
        }
    }
}
