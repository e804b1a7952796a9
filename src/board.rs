//! Board engine: refresh passes and the published snapshot.
//!
//! A refresh classifies the board, scores the scenario-carrying tasks and
//! publishes the result as one immutable [`BoardSnapshot`]. Readers always
//! see either the previous snapshot or the new one in full. A failed or
//! cancelled refresh leaves the previous snapshot in place.
//!
//! Scoring populations:
//! - `MineUnstarted` tasks are scored against `OthersPending`.
//! - `OthersPending` tasks are scored against both scored buckets.

use crate::classify::{BucketRules, Classification, TaskClassifier};
use crate::conflict::{rank_by_rate, CodeConflictAnalyzer, ConflictReport, ConflictScorer};
use crate::error::{Result, TaitiError};
use crate::progress::ProgressReporter;
use crate::scenario::ScenarioSet;
use crate::sync::{CleanupReport, ScenarioSync};
use crate::task::{Task, TaskBucket};
use crate::tracker::TrackerClient;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// =============================================================================
// Snapshot
// =============================================================================

/// Result of one complete refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoardSnapshot {
    pub scope_id: String,
    pub user_id: String,
    pub classification: Classification,
    /// Score reports keyed by task id.
    pub reports: BTreeMap<String, ConflictReport>,
    /// `None` until the first refresh completes.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl BoardSnapshot {
    /// Whether a refresh has ever been published.
    pub fn is_populated(&self) -> bool {
        self.refreshed_at.is_some()
    }

    pub fn report(&self, task_id: &str) -> Option<&ConflictReport> {
        self.reports.get(task_id)
    }

    pub fn bucket(&self, bucket: TaskBucket) -> &[Task] {
        self.classification.bucket(bucket)
    }
}

/// Holder of the current snapshot. Replaced wholesale, never patched.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<BoardSnapshot>>,
}

impl SnapshotStore {
    pub fn get(&self) -> Arc<BoardSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn publish(&self, snapshot: BoardSnapshot) -> Arc<BoardSnapshot> {
        let snapshot = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot.clone(),
            Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
        }
        snapshot
    }
}

// =============================================================================
// BoardEngine
// =============================================================================

/// Drives refresh passes and scenario edits for one board.
///
/// # Example
///
/// ```rust,ignore
/// let engine = BoardEngine::new(tracker, "board-id", config.bucket_rules());
/// let snapshot = engine.refresh(&TracingProgress, &CancellationToken::new()).await?;
/// for task in snapshot.bucket(TaskBucket::MineUnstarted) {
///     println!("{} {}%", task.name, task.conflict_rate);
/// }
/// ```
pub struct BoardEngine {
    scope_id: String,
    sync: ScenarioSync,
    scorer: ConflictScorer,
    rules: BucketRules,
    snapshot: SnapshotStore,
}

impl BoardEngine {
    pub fn new(tracker: Arc<dyn TrackerClient>, scope_id: impl Into<String>, rules: BucketRules) -> Self {
        Self {
            scope_id: scope_id.into(),
            sync: ScenarioSync::new(tracker),
            scorer: ConflictScorer::new(),
            rules,
            snapshot: SnapshotStore::default(),
        }
    }

    /// Enable deep scoring.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn CodeConflictAnalyzer>) -> Self {
        self.scorer = self.scorer.with_analyzer(analyzer);
        self
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    /// The last published snapshot.
    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.snapshot.get()
    }

    /// Id of the member the tracker credentials belong to.
    ///
    /// # Errors
    ///
    /// Returns [`TaitiError::TrackerConnectivity`] if the tracker refuses.
    pub async fn current_user(&self) -> Result<String> {
        self.sync
            .tracker()
            .authenticated_user_id()
            .await
            .map_err(|e| TaitiError::connectivity("resolve current user", &e))
    }

    /// Run a full refresh and publish its snapshot.
    ///
    /// # Errors
    ///
    /// - [`TaitiError::TrackerConnectivity`] if the user or items cannot be
    ///   fetched.
    /// - [`TaitiError::Cancelled`] if `cancel` fires.
    ///
    /// In both cases the previous snapshot stays published.
    pub async fn refresh(
        &self,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Arc<BoardSnapshot>> {
        let outcome = self.build_snapshot(progress, cancel).await;
        match outcome {
            Ok(snapshot) => {
                info!(
                    scope_id = %self.scope_id,
                    mine_unstarted = snapshot.classification.mine_unstarted.len(),
                    others_pending = snapshot.classification.others_pending.len(),
                    no_scenario = snapshot.classification.no_scenario.len(),
                    "Published board snapshot"
                );
                Ok(self.snapshot.publish(snapshot))
            }
            Err(e) => {
                warn!(scope_id = %self.scope_id, "Refresh abandoned, keeping previous snapshot: {}", e);
                Err(e)
            }
        }
    }

    async fn build_snapshot(
        &self,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<BoardSnapshot> {
        let user_id = self.current_user().await?;
        let mut classification = TaskClassifier::new(&self.sync, &self.rules)
            .classify(&self.scope_id, &user_id, progress, cancel)
            .await?;

        let reports = self.score(&mut classification, progress, cancel).await?;

        Ok(BoardSnapshot {
            scope_id: self.scope_id.clone(),
            user_id,
            classification,
            reports,
            refreshed_at: Some(Utc::now()),
        })
    }

    async fn score(
        &self,
        classification: &mut Classification,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, ConflictReport>> {
        let mine = classification.mine_unstarted.clone();
        let others = classification.others_pending.clone();
        let everyone: Vec<Task> = mine.iter().chain(others.iter()).cloned().collect();
        let total = mine.len() + others.len();

        let mut reports = BTreeMap::new();
        let targets = classification
            .mine_unstarted
            .iter_mut()
            .map(|t| (t, others.as_slice()))
            .chain(
                classification
                    .others_pending
                    .iter_mut()
                    .map(|t| (t, everyone.as_slice())),
            );

        for (idx, (task, population)) in targets.enumerate() {
            if cancel.is_cancelled() {
                return Err(TaitiError::Cancelled);
            }
            progress.set_fraction(idx as f64 / total as f64);
            progress.set_text(&format!("Scoring task {} of {}", idx + 1, total));
            progress.set_detail(&format!("Task: {}", task.name));

            let report = self.scorer.score(task, population, cancel).await?;
            report.apply_to(task);
            reports.insert(task.id.clone(), report);
        }

        rank_by_rate(&mut classification.mine_unstarted);
        rank_by_rate(&mut classification.others_pending);
        progress.set_fraction(1.0);
        Ok(reports)
    }

    /// Read one item's scenario set straight from the tracker.
    ///
    /// # Errors
    ///
    /// Returns [`TaitiError::ItemScenarioRead`] if the read fails.
    pub async fn read_scenarios(&self, item_id: &str) -> Result<Option<ScenarioSet>> {
        self.sync.read(item_id).await
    }

    /// Replace one item's scenario set.
    ///
    /// # Errors
    ///
    /// See [`ScenarioSync::write`].
    pub async fn write_scenarios(&self, item_id: &str, scenarios: &ScenarioSet) -> Result<()> {
        self.sync.write(item_id, scenarios).await
    }

    /// Remove one item's scenario set.
    ///
    /// # Errors
    ///
    /// See [`ScenarioSync::delete`].
    pub async fn delete_scenarios(&self, item_id: &str) -> Result<CleanupReport> {
        self.sync.delete(item_id).await
    }
}
