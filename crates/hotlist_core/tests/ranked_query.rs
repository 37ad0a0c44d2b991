mod common;

use common::{cast_votes, memory_service, seed_item};
use hotlist_core::service::ranked_query::RankedQuery;
use hotlist_core::{Cursor, Direction, FeedError, Item, ItemKey, ValidationError};
use std::collections::HashSet;

fn keys(items: &[Item]) -> Vec<u64> {
    items.iter().map(|item| item.key.as_nanos()).collect()
}

#[tokio::test]
async fn descending_pages_cover_every_item_once() {
    let (backend, service) = memory_service();
    for nanos in 1..=23u64 {
        let item = seed_item(&service, nanos).await;
        cast_votes(&service, item.key, (nanos % 5) as usize).await;
    }
    let query = RankedQuery::new(backend, 20, 100);

    let mut seen = Vec::new();
    let mut cursor: Option<Cursor> = None;
    loop {
        let page = query
            .query("gif", cursor.as_ref(), Direction::Descending, Some(7))
            .await
            .unwrap();
        assert!(page.items.len() <= 7);
        seen.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen.len(), 23);
    let single = query
        .query("gif", None, Direction::Descending, Some(23))
        .await
        .unwrap();
    assert_eq!(single.items, seen);
    let unique: HashSet<ItemKey> = seen.iter().map(|item| item.key).collect();
    assert_eq!(unique.len(), 23);
    for pair in seen.windows(2) {
        assert!(
            (pair[0].score, pair[0].key) > (pair[1].score, pair[1].key),
            "page order broken between {} and {}",
            pair[0].key,
            pair[1].key
        );
    }
}

#[tokio::test]
async fn equal_scores_order_by_key() {
    let (backend, service) = memory_service();
    for nanos in [5u64, 1, 3] {
        seed_item(&service, nanos).await;
    }
    let query = RankedQuery::new(backend, 20, 100);

    let first = query
        .query("gif", None, Direction::Descending, Some(2))
        .await
        .unwrap();
    assert_eq!(keys(&first.items), vec![5, 3]);

    let second = query
        .query("gif", first.next_cursor.as_ref(), Direction::Descending, Some(2))
        .await
        .unwrap();
    assert_eq!(keys(&second.items), vec![1]);
    assert!(second.next_cursor.is_none());

    // Same cursor, same page.
    let again = query
        .query("gif", first.next_cursor.as_ref(), Direction::Descending, Some(2))
        .await
        .unwrap();
    assert_eq!(again, second);
}

#[tokio::test]
async fn ascending_scan_returns_items_above_cursor_lowest_first() {
    let (backend, service) = memory_service();
    for (nanos, votes) in [(1u64, 0usize), (2, 1), (3, 2), (4, 3)] {
        let item = seed_item(&service, nanos).await;
        cast_votes(&service, item.key, votes).await;
    }
    let query = RankedQuery::new(backend, 20, 100);

    let cursor = Cursor::new("gif", 1, ItemKey::from_nanos(2));
    let page = query
        .query("gif", Some(&cursor), Direction::Ascending, None)
        .await
        .unwrap();
    assert_eq!(keys(&page.items), vec![3, 4]);
    assert_eq!(
        page.items.iter().map(|item| item.score).collect::<Vec<_>>(),
        vec![2, 3]
    );
}

#[tokio::test]
async fn first_page_is_descending_for_either_direction() {
    let (backend, service) = memory_service();
    for (nanos, votes) in [(1u64, 0usize), (2, 2), (3, 1)] {
        let item = seed_item(&service, nanos).await;
        cast_votes(&service, item.key, votes).await;
    }
    let query = RankedQuery::new(backend, 20, 100);

    let ascending = query
        .query("gif", None, Direction::Ascending, None)
        .await
        .unwrap();
    let descending = query
        .query("gif", None, Direction::Descending, None)
        .await
        .unwrap();
    assert_eq!(keys(&ascending.items), vec![2, 3, 1]);
    assert_eq!(ascending, descending);
}

#[tokio::test]
async fn limit_is_defaulted_and_clamped() {
    let (backend, service) = memory_service();
    for nanos in 1..=30u64 {
        seed_item(&service, nanos).await;
    }
    let query = RankedQuery::new(backend, 20, 25);

    let page = query
        .query("gif", None, Direction::Descending, Some(0))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 20);

    let page = query
        .query("gif", None, Direction::Descending, Some(1_000))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 25);
}

#[tokio::test]
async fn empty_category_yields_empty_page() {
    let (backend, _service) = memory_service();
    let page = RankedQuery::new(backend, 20, 100)
        .query("gif", None, Direction::Descending, None)
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn foreign_cursor_is_rejected() {
    let (backend, _service) = memory_service();
    let cursor = Cursor::new("jpg", 0, ItemKey::from_nanos(1));
    let err = RankedQuery::new(backend, 20, 100)
        .query("gif", Some(&cursor), Direction::Descending, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FeedError::Validation(ValidationError::CursorCategoryMismatch { .. })
    ));
}
