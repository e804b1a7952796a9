//! Custom assertions for domain-specific testing.
//!
//! Provides expressive assertions for classification and scoring results.

use crate::classify::Classification;
use crate::conflict::ConflictReport;
use crate::task::TaskBucket;
use std::collections::HashMap;

/// Assert that every task of a classification sits in exactly one bucket
/// and that no task without scenarios reached a scored bucket.
///
/// # Panics
///
/// Panics with a descriptive message naming the offending task.
///
/// # Example
///
/// ```rust,ignore
/// let result = classifier.classify("board", "me", &NoProgress, &cancel).await?;
/// assert_partition(&result);
/// ```
pub fn assert_partition(result: &Classification) {
    let mut seen: HashMap<&str, TaskBucket> = HashMap::new();
    for bucket in [
        TaskBucket::MineUnstarted,
        TaskBucket::OthersPending,
        TaskBucket::NoScenario,
    ] {
        for task in result.bucket(bucket) {
            if let Some(previous) = seen.insert(&task.id, bucket) {
                panic!(
                    "Task {} appears in both {:?} and {:?}",
                    task.id, previous, bucket
                );
            }
            if bucket != TaskBucket::NoScenario {
                assert!(
                    task.scenarios.is_some(),
                    "Task {} has no scenario set but was placed in {:?}",
                    task.id,
                    bucket
                );
            }
        }
    }
}

/// Assert that a task landed in the expected bucket.
///
/// # Panics
///
/// Panics if the task is missing or sits in another bucket.
pub fn assert_bucket(result: &Classification, item_id: &str, expected: TaskBucket) {
    match result.find(item_id) {
        Some((bucket, _)) => assert_eq!(
            bucket, expected,
            "Expected task {} in {:?}, but it is in {:?}",
            item_id, expected, bucket
        ),
        None => panic!("Expected task {item_id} in {expected:?}, but it was not classified"),
    }
}

/// Assert the ids of the conflicting tasks, in display order.
///
/// # Panics
///
/// Panics if the ids differ.
///
/// # Example
///
/// ```rust,ignore
/// let report = scorer.score(&a, &[b, c], &cancel).await?;
/// assert_conflicts(&report, &["B"]);
/// ```
pub fn assert_conflicts(report: &ConflictReport, expected_ids: &[&str]) {
    let ids: Vec<&str> = report
        .conflicting_tasks
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(
        ids, expected_ids,
        "Unexpected conflicting tasks for {}.\nPairs: {:?}",
        report.task_id, report.pairs
    );
}

/// Assert a report's displayed rate.
///
/// # Panics
///
/// Panics if the rate differs.
pub fn assert_rate(report: &ConflictReport, expected: f64) {
    assert!(
        (report.rate - expected).abs() < f64::EPSILON,
        "Expected rate {} for {}, but got {} ({})",
        expected,
        report.task_id,
        report.rate,
        report.source
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioSet;
    use crate::task::Task;
    use crate::tracker::RawItem;

    fn task(id: &str, scenarios: Option<ScenarioSet>) -> Task {
        let mut task = Task::from_raw(RawItem {
            id: id.into(),
            ..Default::default()
        });
        task.scenarios = scenarios;
        task
    }

    #[test]
    fn test_assert_partition_passes() {
        let result = Classification {
            mine_unstarted: vec![task("a", Some(ScenarioSet::new()))],
            no_scenario: vec![task("b", None)],
            ..Default::default()
        };
        assert_partition(&result);
        assert_bucket(&result, "b", TaskBucket::NoScenario);
    }

    #[test]
    #[should_panic(expected = "appears in both")]
    fn test_assert_partition_catches_duplicates() {
        let result = Classification {
            mine_unstarted: vec![task("a", Some(ScenarioSet::new()))],
            others_pending: vec![task("a", Some(ScenarioSet::new()))],
            ..Default::default()
        };
        assert_partition(&result);
    }

    #[test]
    #[should_panic(expected = "has no scenario set")]
    fn test_assert_partition_catches_missing_scenarios() {
        let result = Classification {
            others_pending: vec![task("a", None)],
            ..Default::default()
        };
        assert_partition(&result);
    }
}
