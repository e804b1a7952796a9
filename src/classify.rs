//! Board classification.
//!
//! One pass lists every item on a board, reads each item's scenario set and
//! sorts the items into the three [`TaskBucket`]s:
//!
//! | Tracker list | Assigned to me | Scenarios | Bucket |
//! |--------------|----------------|-----------|--------|
//! | unstarted | yes | present | `MineUnstarted` |
//! | unstarted | no | present | `OthersPending` |
//! | started | any | present | `OthersPending` |
//! | unstarted / started | any | absent or unreadable | `NoScenario` |
//! | anything else | any | any | not part of the pass |
//!
//! A pass is all-or-nothing: it returns a complete [`Classification`] or an
//! error, never a partial one.

use crate::error::{Result, TaitiError};
use crate::progress::ProgressReporter;
use crate::sync::ScenarioSync;
use crate::task::{Task, TaskBucket};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default list names treated as "not started yet".
pub const DEFAULT_UNSTARTED_LISTS: &[&str] = &["TODO", "Backlog", "Unstarted"];

/// Default list names treated as "in progress".
pub const DEFAULT_STARTED_LISTS: &[&str] = &["DOING"];

// =============================================================================
// Bucket rules
// =============================================================================

/// What a tracker list means for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateRole {
    Unstarted,
    Started,
}

/// Maps tracker lists to [`StateRole`]s.
///
/// Each entry matches either a list id exactly or a list name ignoring
/// case. Lists that match nothing are left out of the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRules {
    pub unstarted: Vec<String>,
    pub started: Vec<String>,
}

impl Default for BucketRules {
    fn default() -> Self {
        Self {
            unstarted: DEFAULT_UNSTARTED_LISTS.iter().map(|s| s.to_string()).collect(),
            started: DEFAULT_STARTED_LISTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BucketRules {
    pub fn new(unstarted: Vec<String>, started: Vec<String>) -> Self {
        Self { unstarted, started }
    }

    /// Role of the list an item sits in.
    ///
    /// Unstarted wins if a list is claimed by both sides.
    #[must_use]
    pub fn role_of(&self, state_id: &str, state_name: Option<&str>) -> Option<StateRole> {
        let hit = |entries: &[String]| {
            entries.iter().any(|e| {
                e == state_id || state_name.is_some_and(|name| e.eq_ignore_ascii_case(name.trim()))
            })
        };
        if hit(&self.unstarted) {
            Some(StateRole::Unstarted)
        } else if hit(&self.started) {
            Some(StateRole::Started)
        } else {
            None
        }
    }

    /// Bucket for a task already known to sit in a mapped list.
    #[must_use]
    pub fn bucket_for(&self, task: &Task, role: StateRole, current_user_id: &str) -> TaskBucket {
        if task.scenarios.is_none() {
            return TaskBucket::NoScenario;
        }
        match role {
            StateRole::Unstarted if task.is_assigned_to(current_user_id) => TaskBucket::MineUnstarted,
            StateRole::Unstarted | StateRole::Started => TaskBucket::OthersPending,
        }
    }
}

// =============================================================================
// Classification result
// =============================================================================

/// An item whose scenarios could not be read during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedItem {
    pub item_id: String,
    pub reason: String,
}

/// The output of one complete classification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub mine_unstarted: Vec<Task>,
    pub others_pending: Vec<Task>,
    pub no_scenario: Vec<Task>,
    /// Items that landed in `no_scenario` because their read failed.
    pub degraded: Vec<DegradedItem>,
    pub classified_at: DateTime<Utc>,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            mine_unstarted: Vec::new(),
            others_pending: Vec::new(),
            no_scenario: Vec::new(),
            degraded: Vec::new(),
            classified_at: Utc::now(),
        }
    }
}

impl Classification {
    pub fn bucket(&self, bucket: TaskBucket) -> &[Task] {
        match bucket {
            TaskBucket::MineUnstarted => &self.mine_unstarted,
            TaskBucket::OthersPending => &self.others_pending,
            TaskBucket::NoScenario => &self.no_scenario,
        }
    }

    /// Total number of classified tasks.
    pub fn len(&self) -> usize {
        self.mine_unstarted.len() + self.others_pending.len() + self.no_scenario.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a task and the bucket it landed in.
    pub fn find(&self, item_id: &str) -> Option<(TaskBucket, &Task)> {
        [
            TaskBucket::MineUnstarted,
            TaskBucket::OthersPending,
            TaskBucket::NoScenario,
        ]
        .into_iter()
        .find_map(|b| self.bucket(b).iter().find(|t| t.id == item_id).map(|t| (b, t)))
    }

    fn push(&mut self, bucket: TaskBucket, task: Task) {
        match bucket {
            TaskBucket::MineUnstarted => self.mine_unstarted.push(task),
            TaskBucket::OthersPending => self.others_pending.push(task),
            TaskBucket::NoScenario => self.no_scenario.push(task),
        }
    }
}

// =============================================================================
// TaskClassifier
// =============================================================================

/// Runs classification passes against a tracker.
pub struct TaskClassifier<'a> {
    sync: &'a ScenarioSync,
    rules: &'a BucketRules,
}

impl<'a> TaskClassifier<'a> {
    pub fn new(sync: &'a ScenarioSync, rules: &'a BucketRules) -> Self {
        Self { sync, rules }
    }

    /// Classify every item in `scope_id` for `current_user_id`.
    ///
    /// Items are processed one at a time; `cancel` is checked before each.
    ///
    /// # Errors
    ///
    /// - [`TaitiError::TrackerConnectivity`] if the items cannot be listed.
    /// - [`TaitiError::Cancelled`] if `cancel` fires. Nothing is returned
    ///   from the items processed so far.
    ///
    /// Per-item read failures are not errors; see [`Classification::degraded`].
    pub async fn classify(
        &self,
        scope_id: &str,
        current_user_id: &str,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Classification> {
        if cancel.is_cancelled() {
            return Err(TaitiError::Cancelled);
        }

        let items = self
            .sync
            .tracker()
            .list_items(scope_id)
            .await
            .map_err(|e| TaitiError::connectivity("list items", &e))?;

        let total = items.len();
        info!(scope_id, items = total, "Classifying board");

        let mut result = Classification::default();
        for (idx, item) in items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(processed = idx, "Classification cancelled");
                return Err(TaitiError::Cancelled);
            }

            progress.set_fraction(idx as f64 / total as f64);
            progress.set_text(&format!("Processing card {} of {}", idx + 1, total));
            progress.set_detail(&format!("Card: {}", item.name));

            let Some(role) = self.rules.role_of(&item.state_id, item.state_name.as_deref()) else {
                debug!(item_id = %item.id, state = ?item.state_name, "Skipping item outside mapped lists");
                continue;
            };

            let mut task = Task::from_raw(item);
            match self.sync.read(&task.id).await {
                Ok(scenarios) => task.scenarios = scenarios,
                Err(e) => {
                    warn!(item_id = %task.id, "Treating item as having no scenarios: {}", e);
                    result.degraded.push(DegradedItem {
                        item_id: task.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            let bucket = self.rules.bucket_for(&task, role, current_user_id);
            debug!(item_id = %task.id, ?bucket, "Classified item");
            result.push(bucket, task);
        }

        progress.set_fraction(1.0);
        result.classified_at = Utc::now();
        info!(
            mine_unstarted = result.mine_unstarted.len(),
            others_pending = result.others_pending.len(),
            no_scenario = result.no_scenario.len(),
            degraded = result.degraded.len(),
            "Classification complete"
        );
        Ok(result)
    }
}
