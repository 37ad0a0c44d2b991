mod common;

use common::{cast_votes, seed_item, FaultyBackend};
use hotlist_core::repo::memory::MemoryBackend;
use hotlist_core::{
    EngineConfig, FeedBackend, FeedError, FeedService, ReconcileReport, Reconciler, VoteRequest,
};
use std::sync::Arc;

#[tokio::test]
async fn consistent_scores_are_left_alone() {
    let backend = Arc::new(MemoryBackend::new());
    let service = FeedService::new(Arc::clone(&backend), &EngineConfig::default());
    for nanos in 1..=3u64 {
        let item = seed_item(&service, nanos).await;
        cast_votes(&service, item.key, nanos as usize).await;
    }

    let report = Reconciler::new(backend).reconcile("gif").await.unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            scanned: 3,
            repaired: 0
        }
    );
}

#[tokio::test]
async fn lost_increment_is_repaired() {
    let backend = Arc::new(FaultyBackend::new());
    let service = FeedService::new(Arc::clone(&backend), &EngineConfig::default());
    let item = seed_item(&service, 1).await;
    cast_votes(&service, item.key, 2).await;

    backend.reject_next_increments(u32::MAX);
    let err = service
        .vote(&VoteRequest {
            actor: "late".to_string(),
            key: item.key,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::ScoreNotApplied { .. }));
    backend.reject_next_increments(0);

    let before = backend.get_item("gif", &item.key).await.unwrap().unwrap();
    assert_eq!(before.score, 2);

    let report = Reconciler::new(Arc::clone(&backend))
        .reconcile("gif")
        .await
        .unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.repaired, 1);

    let after = backend.get_item("gif", &item.key).await.unwrap().unwrap();
    assert_eq!(after.score, 3);
}

#[tokio::test]
async fn overcounted_scores_are_lowered() {
    let backend = Arc::new(MemoryBackend::new());
    let service = FeedService::new(Arc::clone(&backend), &EngineConfig::default());
    let mut keys = Vec::new();
    for nanos in 1..=150u64 {
        keys.push(seed_item(&service, nanos).await.key);
    }
    backend.set_score("gif", &keys[10], 9).await.unwrap();
    backend.set_score("gif", &keys[120], 4).await.unwrap();

    let report = Reconciler::new(Arc::clone(&backend))
        .reconcile("gif")
        .await
        .unwrap();
    assert_eq!(report.scanned, 150);
    assert_eq!(report.repaired, 2);
    for key in [keys[10], keys[120]] {
        assert_eq!(backend.get_item("gif", &key).await.unwrap().unwrap().score, 0);
    }
}
