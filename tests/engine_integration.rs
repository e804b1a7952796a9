//! End-to-end tests of the engine against the in-memory tracker.

use std::sync::Arc;

use taiti::progress::{NoProgress, RecordingProgress};
use taiti::scenario::transfer;
use taiti::testing::{
    assert_bucket, assert_conflicts, assert_partition, assert_rate, MockConflictAnalyzer,
    MockTracker, TrackerOp,
};
use taiti::{
    BoardEngine, BucketRules, ConflictScorer, RateSource, ScenarioReference, ScenarioSet,
    ScenarioSync, TaitiError, Task, TaskBucket, TaskClassifier, TrackerClient, WriteStage,
    MARKER_TEXT,
};
use tokio_util::sync::CancellationToken;

fn set(refs: &[(&str, u32)]) -> ScenarioSet {
    refs.iter()
        .map(|(path, line)| ScenarioReference::new(*path, *line))
        .collect()
}

/// Board used throughout: two of mine, three of others, one finished card.
fn sprint_board() -> Arc<MockTracker> {
    Arc::new(
        MockTracker::new()
            .with_list("l-backlog", "Backlog")
            .with_list("l-todo", "TODO")
            .with_list("l-doing", "DOING")
            .with_list("l-done", "Done")
            .with_current_user("me")
            .with_item_assigned("checkout", "Checkout flow", "l-todo", &["me"])
            .with_scenarios(
                "checkout",
                set(&[("features/checkout.feature", 10), ("features/checkout.feature", 12)]),
            )
            .with_item_assigned("profile", "Profile page", "l-backlog", &["me"])
            .with_item_assigned("cart", "Cart totals", "l-doing", &["ana"])
            .with_scenarios(
                "cart",
                set(&[("features/checkout.feature", 12), ("features/cart.feature", 3)]),
            )
            .with_item_assigned("search", "Search", "l-doing", &["joe"])
            .with_scenarios("search", set(&[("features/search.feature", 1)]))
            .with_item_assigned("coupons", "Coupons", "l-todo", &["ana", "me"])
            .with_scenarios("coupons", set(&[("features/cart.feature", 3)]))
            .with_item_assigned("legacy", "Legacy cleanup", "l-done", &["joe"])
            .with_scenarios("legacy", set(&[("features/checkout.feature", 10)])),
    )
}

// =============================================================================
// Scenario sync
// =============================================================================

#[tokio::test]
async fn test_round_trip_preserves_set() {
    let tracker = sprint_board();
    let sync = ScenarioSync::new(tracker.clone());
    let scenarios = set(&[
        ("features/profile.feature", 4),
        ("features/profile.feature", 30),
        ("/abs/path/features/avatar.feature", 8),
    ]);

    sync.write("profile", &scenarios).await.unwrap();
    assert_eq!(sync.read("profile").await.unwrap(), Some(scenarios));
}

#[tokio::test]
async fn test_overwrite_keeps_one_marker() {
    let tracker = sprint_board();
    let sync = ScenarioSync::new(tracker.clone());

    sync.write("checkout", &set(&[("a.feature", 1)])).await.unwrap();
    sync.write("checkout", &set(&[("b.feature", 2)])).await.unwrap();

    assert_eq!(tracker.marker_count("checkout"), 1);
    assert_eq!(
        sync.read("checkout").await.unwrap(),
        Some(set(&[("b.feature", 2)]))
    );
}

#[tokio::test]
async fn test_delete_without_scenarios_is_noop() {
    let tracker = sprint_board();
    let sync = ScenarioSync::new(tracker.clone());

    let report = sync.delete("profile").await.unwrap();
    assert_eq!(report.comments_deleted, 0);
    assert_eq!(report.attachments_deleted, 0);
    assert!(report.is_clean());
    assert_eq!(tracker.calls(TrackerOp::DeleteComment), 0);
}

#[tokio::test]
async fn test_comment_failure_leaves_no_stray_set() {
    let tracker = sprint_board();
    let sync = ScenarioSync::new(tracker.clone());
    tracker.fail_item_on("profile", TrackerOp::PostComment);

    let err = sync
        .write("profile", &set(&[("features/profile.feature", 4)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TaitiError::ScenarioWrite {
            stage: WriteStage::Comment,
            ..
        }
    ));
    assert!(err.is_recoverable());

    tracker.clear_failures();
    assert_eq!(sync.read("profile").await.unwrap(), None);
    assert_eq!(tracker.attachment_count("profile"), 0);
}

#[tokio::test]
async fn test_failed_rollback_is_reported_as_inconsistent() {
    let tracker = sprint_board();
    let sync = ScenarioSync::new(tracker.clone());
    tracker.fail_item_on("profile", TrackerOp::PostComment);
    tracker.fail_item_on("profile", TrackerOp::DeleteAttachment);

    let err = sync
        .write("profile", &set(&[("features/profile.feature", 4)]))
        .await
        .unwrap_err();
    match &err {
        TaitiError::ScenarioWriteInconsistent { item_id, .. } => assert_eq!(item_id, "profile"),
        other => panic!("Wrong error variant: {other:?}"),
    }
    assert!(err.requires_user_warning());
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_malformed_transfer_line_is_skipped() {
    let tracker = sprint_board();
    tracker
        .upload_attachment("profile", "scenarios.csv", b"x.feature,[3, abc, 7]\n".to_vec())
        .await
        .unwrap();
    tracker.post_comment("profile", MARKER_TEXT).await.unwrap();

    let sync = ScenarioSync::new(tracker.clone());
    assert_eq!(
        sync.read("profile").await.unwrap(),
        Some(set(&[("x.feature", 3), ("x.feature", 7)]))
    );
}

#[tokio::test]
async fn test_unusual_paths_survive_write_and_read() {
    let tracker = sprint_board();
    let sync = ScenarioSync::new(tracker.clone());
    let scenarios = set(&[
        (" spaced/checkout.feature", 4),
        ("say \"hi\".feature", 9),
        ("multi\nline.feature", 2),
        ("", 1),
    ]);

    sync.write("profile", &scenarios).await.unwrap();
    assert_eq!(sync.read("profile").await.unwrap(), Some(scenarios));
}

#[tokio::test]
async fn test_uploaded_file_uses_transfer_format() {
    let tracker = sprint_board();
    let sync = ScenarioSync::new(tracker.clone());
    let scenarios = set(&[("features/profile.feature", 12), ("features/profile.feature", 48)]);
    sync.write("profile", &scenarios).await.unwrap();

    let attachments = tracker.attachments("profile").await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert!(attachments[0].name.ends_with(".csv"));
    let bytes = tracker.download_attachment(&attachments[0]).await.unwrap();
    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        "features/profile.feature,[12, 48]\n"
    );
    assert_eq!(transfer::encode(&scenarios), "features/profile.feature,[12, 48]\n");
}

// =============================================================================
// Classification
// =============================================================================

#[tokio::test]
async fn test_classification_partitions_board() {
    let tracker = sprint_board();
    let sync = ScenarioSync::new(tracker.clone());
    let rules = BucketRules::default();

    let result = TaskClassifier::new(&sync, &rules)
        .classify("board", "me", &NoProgress, &CancellationToken::new())
        .await
        .unwrap();

    assert_partition(&result);
    assert_bucket(&result, "checkout", TaskBucket::MineUnstarted);
    assert_bucket(&result, "coupons", TaskBucket::MineUnstarted);
    assert_bucket(&result, "profile", TaskBucket::NoScenario);
    assert_bucket(&result, "cart", TaskBucket::OthersPending);
    assert_bucket(&result, "search", TaskBucket::OthersPending);
    assert!(result.find("legacy").is_none());
}

#[tokio::test]
async fn test_unreadable_item_degrades_without_aborting() {
    let tracker = sprint_board();
    tracker.fail_item_on("cart", TrackerOp::DownloadAttachment);
    let sync = ScenarioSync::new(tracker.clone());
    let rules = BucketRules::default();

    let result = TaskClassifier::new(&sync, &rules)
        .classify("board", "me", &NoProgress, &CancellationToken::new())
        .await
        .unwrap();

    assert_partition(&result);
    assert_bucket(&result, "cart", TaskBucket::NoScenario);
    assert_eq!(result.degraded.len(), 1);
    assert_bucket(&result, "search", TaskBucket::OthersPending);
}

#[tokio::test]
async fn test_custom_bucket_rules() {
    let tracker = sprint_board();
    let sync = ScenarioSync::new(tracker.clone());
    let rules = BucketRules::new(vec!["todo".into()], vec!["done".into()]);

    let result = TaskClassifier::new(&sync, &rules)
        .classify("board", "me", &NoProgress, &CancellationToken::new())
        .await
        .unwrap();

    assert_bucket(&result, "legacy", TaskBucket::OthersPending);
    assert!(result.find("cart").is_none());
    assert!(result.find("profile").is_none());
}

// =============================================================================
// Scoring
// =============================================================================

fn task(id: &str, refs: &[(&str, u32)]) -> Task {
    Task::from_raw(taiti::tracker::RawItem {
        id: id.into(),
        name: id.into(),
        ..Default::default()
    })
    .with_scenarios(set(refs))
}

#[tokio::test]
async fn test_concrete_scoring_case() {
    let a = task("A", &[("f.feature", 10), ("f.feature", 12)]);
    let b = task("B", &[("f.feature", 12), ("g.feature", 3)]);
    let c = task("C", &[("h.feature", 1)]);
    let scorer = ConflictScorer::new();
    let cancel = CancellationToken::new();

    let report = scorer.score(&a, &[b.clone(), c.clone()], &cancel).await.unwrap();
    assert_conflicts(&report, &["B"]);
    assert_rate(&report, 50.0);
    assert_eq!(report.details.len(), 1);
    assert_eq!(report.details[0].file_path, "f.feature");
    assert_eq!(report.details[0].lines, vec![12]);

    let report = scorer.score(&c, &[a, b], &cancel).await.unwrap();
    assert_conflicts(&report, &[]);
    assert_rate(&report, 0.0);
}

#[tokio::test]
async fn test_deep_rate_is_displayed_when_analyzer_present() {
    let a = task("A", &[("f.feature", 10)]);
    let b = task("B", &[("f.feature", 10)]);
    let c = task("C", &[("g.feature", 1)]);
    let analyzer = Arc::new(
        MockConflictAnalyzer::new()
            .with_pair("A", "B", 0.2, &["app/a.rb"])
            .with_pair("A", "C", 0.7, &["app/c.rb"]),
    );

    let report = ConflictScorer::new()
        .with_analyzer(analyzer)
        .score(&a, &[b, c], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.source, RateSource::Deep);
    assert_rate(&report, 45.0);
    assert_eq!(report.overlap_rate, 50.0);
    assert_conflicts(&report, &["C", "B"]);
}

// =============================================================================
// Board refresh
// =============================================================================

#[tokio::test]
async fn test_refresh_ranks_and_publishes() {
    let tracker = sprint_board();
    let engine = BoardEngine::new(tracker.clone(), "board", BucketRules::default());
    let progress = RecordingProgress::new();

    let snapshot = engine
        .refresh(&progress, &CancellationToken::new())
        .await
        .unwrap();

    assert_partition(&snapshot.classification);
    let mine: Vec<(&str, f64)> = snapshot
        .bucket(TaskBucket::MineUnstarted)
        .iter()
        .map(|t| (t.id.as_str(), t.conflict_rate))
        .collect();
    // checkout overlaps cart only (1 of 2); coupons overlaps cart only (1 of 2)
    assert_eq!(mine, vec![("checkout", 50.0), ("coupons", 50.0)]);

    let cart = snapshot.report("cart").unwrap();
    assert_conflicts(cart, &["checkout", "coupons"]);
    assert_rate(cart, 67.0);

    assert!(progress
        .snapshot()
        .texts
        .iter()
        .any(|t| t.starts_with("Scoring task")));
}

#[tokio::test]
async fn test_cancelled_refresh_keeps_previous_snapshot() {
    let tracker = sprint_board();
    let engine = BoardEngine::new(tracker.clone(), "board", BucketRules::default());
    let first = engine
        .refresh(&NoProgress, &CancellationToken::new())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine.refresh(&NoProgress, &cancel).await.unwrap_err();
    assert!(matches!(err, TaitiError::Cancelled));
    assert!(Arc::ptr_eq(&first, &engine.snapshot()));
}

#[tokio::test]
async fn test_connectivity_failure_is_fatal() {
    let tracker = sprint_board();
    tracker.fail_on(TrackerOp::ListItems);
    let engine = BoardEngine::new(tracker.clone(), "board", BucketRules::default());

    let err = engine
        .refresh(&NoProgress, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(!engine.snapshot().is_populated());
}
