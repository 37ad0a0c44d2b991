//! Ranked Query: keyset pagination over the score index.
//!
//! # Invariants
//! - Pages follow the `(score, key)` total order of the scan direction, with
//!   no post-fetch re-sort in either direction.
//! - Without a cursor the scan is descending whatever direction was asked.
//! - Re-running a query with the same cursor returns the same items as long
//!   as no scores changed in between.
//! - `next_cursor` is derived from the last returned item with the same
//!   tie-break the scan uses, so consecutive pages never skip or repeat.

use super::FeedResult;
use crate::model::cursor::{Cursor, Direction};
use crate::model::item::Item;
use crate::model::validation::ValidationError;
use crate::repo::{FeedBackend, ScoreQuery};
use log::{debug, error};
use std::sync::Arc;
use std::time::Instant;

/// One bounded fetch from the score index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedPage {
    pub items: Vec<Item>,
    /// Cursor for the following page; `None` once a short page is returned.
    pub next_cursor: Option<Cursor>,
}

pub struct RankedQuery<B: FeedBackend + ?Sized> {
    backend: Arc<B>,
    default_limit: u32,
    max_limit: u32,
}

impl<B: FeedBackend + ?Sized> RankedQuery<B> {
    pub fn new(backend: Arc<B>, default_limit: u32, max_limit: u32) -> Self {
        Self {
            backend,
            default_limit,
            max_limit,
        }
    }

    /// Maps a requested limit onto `1..=max_limit`; absent or zero means the
    /// default page size.
    pub fn normalize_limit(&self, limit: Option<u32>) -> u32 {
        match limit {
            None | Some(0) => self.default_limit,
            Some(value) if value > self.max_limit => self.max_limit,
            Some(value) => value,
        }
    }

    pub async fn query(
        &self,
        category: &str,
        cursor: Option<&Cursor>,
        direction: Direction,
        limit: Option<u32>,
    ) -> FeedResult<RankedPage> {
        if let Some(cursor) = cursor {
            if cursor.category != category {
                return Err(ValidationError::CursorCategoryMismatch {
                    expected: category.to_string(),
                    actual: cursor.category.clone(),
                }
                .into());
            }
        }

        // A first page always starts at the top of the feed.
        let direction = match cursor {
            Some(_) => direction,
            None => Direction::Descending,
        };
        let limit = self.normalize_limit(limit);
        let query = ScoreQuery {
            category: category.to_string(),
            start_after: cursor.cloned(),
            direction,
            limit,
        };

        let started_at = Instant::now();
        let items = self.backend.query_by_score(&query).await.map_err(|err| {
            error!(
                "event=ranked_query module=ranked_query status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            err
        })?;
        debug!(
            "event=ranked_query module=ranked_query status=ok direction={:?} limit={} returned={} has_cursor={} duration_ms={}",
            direction,
            limit,
            items.len(),
            cursor.is_some(),
            started_at.elapsed().as_millis()
        );

        let next_cursor = if items.len() == limit as usize {
            items.last().map(Cursor::after)
        } else {
            None
        };

        Ok(RankedPage { items, next_cursor })
    }
}
