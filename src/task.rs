//! Tasks built from tracker items.
//!
//! A [`Task`] is rebuilt from scratch on every classification pass. Its
//! `conflict_rate` and `conflicting_tasks` are scoring outputs that live
//! only in the local snapshot and are never written back to the tracker.

use crate::scenario::ScenarioSet;
use crate::tracker::RawItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lightweight handle to another task, used in conflict listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// The three mutually exclusive buckets of a classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskBucket {
    /// Unstarted and assigned to the current user.
    MineUnstarted,
    /// Pending work that may collide with the current user's.
    OthersPending,
    /// No scenario set attached; cannot be scored.
    NoScenario,
}

impl std::fmt::Display for TaskBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MineUnstarted => write!(f, "my unstarted tasks"),
            Self::OthersPending => write!(f, "potential conflict-inducing tasks"),
            Self::NoScenario => write!(f, "tasks without scenarios"),
        }
    }
}

/// A work item with its scenario set and scoring outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub url: String,
    pub state_id: String,
    pub state_name: Option<String>,
    pub description: String,
    pub labels: Vec<String>,
    pub assignee_ids: BTreeSet<String>,
    /// `None` means no scenario set was ever attached, which is different
    /// from an attached but empty set.
    pub scenarios: Option<ScenarioSet>,
    /// Displayed conflict rate in whole percent.
    pub conflict_rate: f64,
    pub conflicting_tasks: Vec<TaskRef>,
}

impl Task {
    /// Build a task from a tracker item. Scenarios are filled in separately.
    #[must_use]
    pub fn from_raw(item: RawItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
            url: item.url,
            state_id: item.state_id,
            state_name: item.state_name,
            description: item.description,
            labels: item.labels,
            assignee_ids: item.member_ids.into_iter().collect(),
            scenarios: None,
            conflict_rate: 0.0,
            conflicting_tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_scenarios(mut self, scenarios: ScenarioSet) -> Self {
        self.scenarios = Some(scenarios);
        self
    }

    #[must_use]
    pub fn has_scenarios(&self) -> bool {
        self.scenarios.is_some()
    }

    /// Scenario set, if one is attached and holds at least one reference.
    #[must_use]
    pub fn populated_scenarios(&self) -> Option<&ScenarioSet> {
        self.scenarios.as_ref().filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assignee_ids.contains(user_id)
    }

    #[must_use]
    pub fn to_ref(&self) -> TaskRef {
        TaskRef {
            id: self.id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
        }
    }
}
