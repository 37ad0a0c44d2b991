mod common;

use common::{cast_votes, memory_service};
use hotlist_core::{
    CreateItemParams, Direction, FeedBackend, FeedService, ItemView, ListParams, ListRequest,
    VoteParams, VoteResult,
};

async fn post<B: FeedBackend + ?Sized + 'static>(service: &FeedService<B>, name: &str) -> String {
    let params = CreateItemParams {
        url: format!("http://img.example/{name}.gif"),
        caption: None,
    };
    let item = service.create_item(params.parse().unwrap()).await.unwrap();
    item.key.to_base64()
}

async fn hot<B: FeedBackend + ?Sized + 'static>(
    service: &FeedService<B>,
    params: ListParams,
) -> Vec<ItemView> {
    let request = params.parse(service.category()).unwrap();
    service
        .list_ranked(&request)
        .await
        .unwrap()
        .items
        .iter()
        .map(ItemView::from_annotated)
        .collect()
}

fn urls(views: &[ItemView]) -> Vec<&str> {
    views
        .iter()
        .map(|view| view.url.trim_start_matches("http://img.example/"))
        .collect()
}

#[tokio::test]
async fn hot_feed_pages_down_and_back_up() {
    let (_backend, service) = memory_service();
    let a = post(&service, "a").await;
    let b = post(&service, "b").await;
    let c = post(&service, "c").await;
    let d = post(&service, "d").await;

    for (key, votes) in [(&b, 3), (&c, 2), (&d, 1)] {
        let key = hotlist_core::ItemKey::from_base64(key).unwrap();
        cast_votes(&service, key, votes).await;
    }

    let first = hot(
        &service,
        ListParams {
            limit: Some("2".to_string()),
            ..ListParams::default()
        },
    )
    .await;
    assert_eq!(urls(&first), vec!["b.gif", "c.gif"]);
    assert_eq!(first[0].score, 3);
    assert_eq!(first[1].score, 2);

    let second = hot(
        &service,
        ListParams {
            key: Some(first[1].key.clone()),
            score: Some(first[1].score.to_string()),
            limit: Some("2".to_string()),
            ..ListParams::default()
        },
    )
    .await;
    assert_eq!(urls(&second), vec!["d.gif", "a.gif"]);
    assert_eq!(second[1].key, a);

    let upward = hot(
        &service,
        ListParams {
            key: Some(second[0].key.clone()),
            score: Some(second[0].score.to_string()),
            forward: Some("true".to_string()),
            ..ListParams::default()
        },
    )
    .await;
    assert_eq!(urls(&upward), vec!["c.gif", "b.gif"]);
    assert_eq!(upward[1].key, b);
    assert_eq!(upward[0].key, c);
    assert_eq!(second[0].key, d);
}

#[tokio::test]
async fn vote_twice_counts_once_and_marks_the_feed() {
    let (_backend, service) = memory_service();
    let key = post(&service, "a").await;
    let params = VoteParams {
        device_id: "ddd".to_string(),
        key: key.clone(),
    };

    let first = service.vote(&params.parse().unwrap()).await.unwrap();
    let VoteResult::Accepted(annotated) = first else {
        panic!("first vote must be accepted");
    };
    let view = ItemView::from_annotated(&annotated);
    assert_eq!(view.score, 1);
    assert!(view.has_voted);

    assert_eq!(
        service.vote(&params.parse().unwrap()).await.unwrap(),
        VoteResult::AlreadyVoted
    );

    let feed = hot(
        &service,
        ListParams {
            device_id: Some("ddd".to_string()),
            ..ListParams::default()
        },
    )
    .await;
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].score, 1);
    assert!(feed[0].has_voted);

    let anonymous = hot(&service, ListParams::default()).await;
    assert!(!anonymous[0].has_voted);
}

#[tokio::test]
async fn forward_without_cursor_still_starts_from_the_top() {
    let (_backend, service) = memory_service();
    let low = post(&service, "low").await;
    let high = post(&service, "high").await;
    cast_votes(
        &service,
        hotlist_core::ItemKey::from_base64(&high).unwrap(),
        2,
    )
    .await;

    let request = ListParams {
        forward: Some("true".to_string()),
        ..ListParams::default()
    }
    .parse(service.category())
    .unwrap();
    assert_eq!(request.direction, Direction::Descending);

    let feed = hot(
        &service,
        ListParams {
            forward: Some("true".to_string()),
            ..ListParams::default()
        },
    )
    .await;
    assert_eq!(feed[0].key, high);
    assert_eq!(feed[1].key, low);
}

#[tokio::test]
async fn ascending_request_without_cursor_lists_highest_first() {
    let (_backend, service) = memory_service();
    let low = post(&service, "low").await;
    let high = post(&service, "high").await;
    cast_votes(
        &service,
        hotlist_core::ItemKey::from_base64(&high).unwrap(),
        1,
    )
    .await;

    let page = service
        .list_ranked(&ListRequest {
            cursor: None,
            direction: Direction::Ascending,
            ..ListRequest::default()
        })
        .await
        .unwrap();
    let keys: Vec<String> = page
        .items
        .iter()
        .map(|annotated| annotated.item.key.to_base64())
        .collect();
    assert_eq!(keys, vec![high, low]);
}

#[tokio::test]
async fn cursor_token_round_trips_through_list_params() {
    let (_backend, service) = memory_service();
    for name in ["a", "b", "c"] {
        post(&service, name).await;
    }

    let request = ListParams {
        limit: Some("2".to_string()),
        ..ListParams::default()
    }
    .parse(service.category())
    .unwrap();
    let page = service.list_ranked(&request).await.unwrap();
    let token = page.next_cursor.expect("full page carries a cursor").to_token();

    let rest = hot(
        &service,
        ListParams {
            cursor: Some(token),
            ..ListParams::default()
        },
    )
    .await;
    assert_eq!(urls(&rest), vec!["a.gif"]);
}
