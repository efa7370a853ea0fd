mod common;

use bridge_traits::time::Clock;
use common::{drain, Harness};
use core_content::{ProgressRepository, ProgressStatus};
use core_runtime::events::{CoreEvent, ProgressEvent};
use core_sync::{ProgressTracker, SyncError};
use std::sync::Arc;

async fn tracker_with_content(ids: &[&str]) -> (Harness, ProgressTracker) {
    let h = Harness::new().await;
    for id in ids {
        h.source.publish(id, 1, &["a", "b", "c"]);
        h.orchestrator.get_content(id).await.unwrap();
    }
    let tracker = ProgressTracker::start(
        h.orchestrator.clone(),
        Arc::clone(&h.clock) as Arc<dyn Clock>,
        h.events.clone(),
    );
    (h, tracker)
}

#[tokio::test]
async fn test_units_accumulate_and_status_advances() {
    let (h, tracker) = tracker_with_content(&["tutorial-x"]).await;

    let first = tracker.mutate_progress("tutorial-x", "unit-a").await.unwrap();
    assert!(first.changed);
    assert_eq!(first.record.status, ProgressStatus::InProgress);

    h.advance_secs(30);
    let second_at = h.clock.now();
    let second = tracker.mutate_progress("tutorial-x", "unit-b").await.unwrap();

    let record = second.record;
    assert_eq!(
        record.completed_units.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["unit-a", "unit-b"]
    );
    assert_eq!(record.status, ProgressStatus::InProgress);
    assert_eq!(record.current_unit_id.as_deref(), Some("unit-b"));
    assert_eq!(record.updated_at, second_at);

    tracker.flush().await.unwrap();
    let stored = h.store.progress().get("tutorial-x").await.unwrap().unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn test_progress_requires_resolvable_content() {
    let (_h, tracker) = tracker_with_content(&[]).await;

    let err = tracker.mutate_progress("never-fetched", "unit-a").await.unwrap_err();
    assert!(matches!(err, SyncError::ContentNotResolvable { .. }));
    assert!(tracker.get("never-fetched").await.unwrap().is_none());
}

#[tokio::test]
async fn test_repeating_current_unit_is_a_no_op() {
    let (h, tracker) = tracker_with_content(&["tutorial-x"]).await;
    tracker.mutate_progress("tutorial-x", "unit-a").await.unwrap();
    let mut rx = h.events.subscribe();

    h.advance_secs(10);
    let again = tracker.mutate_progress("tutorial-x", "unit-a").await.unwrap();

    assert!(!again.changed);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_complete_emits_once() {
    let (h, tracker) = tracker_with_content(&["tutorial-x"]).await;
    tracker.mutate_progress("tutorial-x", "unit-a").await.unwrap();
    let mut rx = h.events.subscribe();

    assert!(tracker.complete("tutorial-x").await.unwrap().changed);
    assert!(!tracker.complete("tutorial-x").await.unwrap().changed);

    let completions = drain(&mut rx)
        .into_iter()
        .filter(|event| matches!(event, CoreEvent::Progress(ProgressEvent::Completed { .. })))
        .count();
    assert_eq!(completions, 1);

    // A later unit does not reopen a completed record.
    let after = tracker.mutate_progress("tutorial-x", "unit-b").await.unwrap();
    assert_eq!(after.record.status, ProgressStatus::Completed);
}

#[tokio::test]
async fn test_writes_are_persisted_in_order() {
    let (h, tracker) = tracker_with_content(&["tutorial-x"]).await;
    for unit in ["u1", "u2", "u3", "u4", "u5"] {
        h.advance_secs(1);
        tracker.mutate_progress("tutorial-x", unit).await.unwrap();
    }
    let last_at = h.clock.now();
    tracker.flush().await.unwrap();

    let stored = h.store.progress().get("tutorial-x").await.unwrap().unwrap();
    assert_eq!(stored.completed_units.len(), 5);
    assert_eq!(stored.current_unit_id.as_deref(), Some("u5"));
    assert_eq!(stored.updated_at, last_at);
}

#[tokio::test]
async fn test_list_by_status_sees_unflushed_changes() {
    let (_h, tracker) = tracker_with_content(&["course-a", "course-b", "course-c"]).await;
    tracker.mutate_progress("course-a", "u1").await.unwrap();
    tracker.mutate_progress("course-b", "u1").await.unwrap();
    tracker.complete("course-b").await.unwrap();

    let in_progress = tracker.list_by_status(ProgressStatus::InProgress).await.unwrap();
    let completed = tracker.list_by_status(ProgressStatus::Completed).await.unwrap();

    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].content_id, "course-a");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].content_id, "course-b");
}

#[tokio::test]
async fn test_rehydrate_restores_progress_offline() {
    let (h, tracker) = tracker_with_content(&["tutorial-x"]).await;
    tracker.mutate_progress("tutorial-x", "unit-a").await.unwrap();
    tracker.shutdown().await.unwrap();

    let restarted = h.restart();
    restarted.go_offline();
    let tracker = ProgressTracker::start(
        restarted.orchestrator.clone(),
        Arc::clone(&restarted.clock) as Arc<dyn Clock>,
        restarted.events.clone(),
    );
    assert_eq!(tracker.rehydrate().await.unwrap(), 1);

    let record = tracker.get("tutorial-x").await.unwrap().unwrap();
    assert!(record.completed_units.contains("unit-a"));

    let next = tracker.mutate_progress("tutorial-x", "unit-b").await.unwrap();
    assert_eq!(next.record.completed_units.len(), 2);
}

#[tokio::test]
async fn test_empty_unit_is_rejected() {
    let (_h, tracker) = tracker_with_content(&["tutorial-x"]).await;
    assert!(matches!(
        tracker.mutate_progress("tutorial-x", " ").await,
        Err(SyncError::InvalidProgress { .. })
    ));
}
