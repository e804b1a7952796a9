//! Conflict-risk scoring.
//!
//! Scoring a task against a population happens in two layers:
//!
//! - **Overlap** (always): which other tasks selected the same scenario
//!   lines. The task-level rate is the share of other scenario-carrying
//!   tasks that overlap at all, in whole percent.
//! - **Deep** (when a [`CodeConflictAnalyzer`] is configured): a pairwise
//!   code-level risk for every other scenario-carrying task, averaged into
//!   a mean relative risk. When present this is the displayed rate.
//!
//! [`ConflictReport::source`] always says which of the two the displayed
//! rate came from.
//!
//! # Example
//!
//! ```rust,ignore
//! let scorer = ConflictScorer::new().with_analyzer(analyzer);
//! let report = scorer.score(&target, &population, &cancel).await?;
//! report.apply_to(&mut target);
//! ```

pub mod analyzer;

pub use analyzer::{CodeConflictAnalyzer, PairwiseRisk};

use crate::error::{Result, TaitiError};
use crate::task::{Task, TaskRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared scenario lines between the target and one other task, in one file.
///
/// Rows are produced in population order, then file order of the target's
/// set. That ordering carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub file_path: String,
    pub lines: Vec<u32>,
    pub other_task_id: String,
    pub other_task_name: String,
}

/// Where a displayed rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSource {
    /// Mean of the pairwise code-level risks.
    Deep,
    /// Share of other tasks with overlapping scenario lines.
    Overlap,
}

impl std::fmt::Display for RateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deep => write!(f, "deep"),
            Self::Overlap => write!(f, "overlap"),
        }
    }
}

/// One row of a task's conflict table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConflict {
    pub other: TaskRef,
    /// Scenario references shared with the target.
    pub shared_refs: usize,
    /// Pair rate in whole percent.
    pub rate: f64,
    pub source: RateSource,
    /// Files behind the rate: the analyzer's answer for deep rows, the
    /// shared scenario files otherwise.
    pub conflicting_files: Vec<String>,
}

/// Fast-path result for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlapScore {
    /// Task-level rate in whole percent.
    pub rate: f64,
    /// Other tasks with at least one shared line, in population order.
    pub conflicting_tasks: Vec<TaskRef>,
    pub details: Vec<ConflictDetail>,
    /// One row per compared task, in population order.
    pub pairs: Vec<PairConflict>,
    /// Number of other tasks with a populated scenario set.
    pub compared: usize,
}

/// Complete scoring result for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub task_id: String,
    /// Displayed rate in whole percent.
    pub rate: f64,
    pub source: RateSource,
    pub overlap_rate: f64,
    pub deep_rate: Option<f64>,
    /// Tasks with a non-zero pair rate, highest first.
    pub conflicting_tasks: Vec<TaskRef>,
    /// Conflict table, highest pair rate first, zero rows dropped.
    pub pairs: Vec<PairConflict>,
    pub details: Vec<ConflictDetail>,
    /// Ids of other tasks whose deep analysis failed and counted as zero.
    pub failed_pairs: Vec<String>,
}

impl ConflictReport {
    /// Copy the displayed outputs onto the task.
    pub fn apply_to(&self, task: &mut Task) {
        task.conflict_rate = self.rate;
        task.conflicting_tasks = self.conflicting_tasks.clone();
    }
}

fn percent(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        (numerator as f64 / denominator as f64 * 100.0).round()
    }
}

/// Scenario-overlap scoring of `target` against `population`.
///
/// Tasks with the target's id and tasks without a populated scenario set
/// are ignored. Pure and deterministic.
#[must_use]
pub fn overlap(target: &Task, population: &[Task]) -> OverlapScore {
    let mut score = OverlapScore::default();
    let target_set = target.populated_scenarios();
    let target_refs = target_set.map_or(0, |s| s.len());

    for other in population.iter().filter(|t| t.id != target.id) {
        let Some(other_set) = other.populated_scenarios() else {
            continue;
        };
        score.compared += 1;

        let shared = target_set.map(|t| t.shared_with(other_set)).unwrap_or_default();
        let shared_refs: usize = shared.iter().map(|f| f.lines.len()).sum();

        if shared_refs > 0 {
            score.conflicting_tasks.push(other.to_ref());
        }
        score.pairs.push(PairConflict {
            other: other.to_ref(),
            shared_refs,
            rate: percent(shared_refs, target_refs),
            source: RateSource::Overlap,
            conflicting_files: shared.iter().map(|f| f.path.clone()).collect(),
        });
        score.details.extend(shared.into_iter().map(|file| ConflictDetail {
            file_path: file.path,
            lines: file.lines,
            other_task_id: other.id.clone(),
            other_task_name: other.name.clone(),
        }));
    }

    score.rate = percent(score.conflicting_tasks.len(), score.compared);
    score
}

/// Sort tasks by displayed conflict rate, highest first. Ties keep their
/// order.
pub fn rank_by_rate(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.conflict_rate.total_cmp(&a.conflict_rate));
}

/// Scores tasks against a population.
#[derive(Clone, Default)]
pub struct ConflictScorer {
    analyzer: Option<Arc<dyn CodeConflictAnalyzer>>,
}

impl std::fmt::Debug for ConflictScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictScorer")
            .field("analyzer", &self.analyzer.as_ref().map(|a| a.name().to_string()))
            .finish()
    }
}

impl ConflictScorer {
    /// Overlap-only scorer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the deep path.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn CodeConflictAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    #[must_use]
    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Score `target` against `population`.
    ///
    /// Deep-analysis failures count as zero for that pair and are listed in
    /// [`ConflictReport::failed_pairs`].
    ///
    /// # Errors
    ///
    /// Returns [`TaitiError::Cancelled`] if `cancel` fires between pairs.
    pub async fn score(
        &self,
        target: &Task,
        population: &[Task],
        cancel: &CancellationToken,
    ) -> Result<ConflictReport> {
        let fast = overlap(target, population);

        let deep = match (&self.analyzer, target.populated_scenarios()) {
            (Some(analyzer), Some(_)) => {
                Some(deep_pass(analyzer.as_ref(), target, population, &fast, cancel).await?)
            }
            _ => None,
        };

        let (rate, source, mut pairs, failed_pairs) = match deep {
            Some(deep) => (deep.rate, RateSource::Deep, deep.pairs, deep.failed),
            None => (fast.rate, RateSource::Overlap, fast.pairs.clone(), Vec::new()),
        };

        pairs.retain(|p| p.rate > 0.0);
        pairs.sort_by(|a, b| b.rate.total_cmp(&a.rate));

        let report = ConflictReport {
            task_id: target.id.clone(),
            rate,
            source,
            overlap_rate: fast.rate,
            deep_rate: (source == RateSource::Deep).then_some(rate),
            conflicting_tasks: pairs.iter().map(|p| p.other.clone()).collect(),
            pairs,
            details: fast.details,
            failed_pairs,
        };
        debug!(
            task_id = %report.task_id,
            rate = report.rate,
            source = %report.source,
            conflicts = report.conflicting_tasks.len(),
            "Scored task"
        );
        Ok(report)
    }
}

struct DeepOutcome {
    rate: f64,
    pairs: Vec<PairConflict>,
    failed: Vec<String>,
}

async fn deep_pass(
    analyzer: &dyn CodeConflictAnalyzer,
    target: &Task,
    population: &[Task],
    fast: &OverlapScore,
    cancel: &CancellationToken,
) -> Result<DeepOutcome> {
    let mut total = 0.0;
    let mut pairs = Vec::with_capacity(fast.pairs.len());
    let mut failed = Vec::new();

    let others = population
        .iter()
        .filter(|t| t.id != target.id && t.populated_scenarios().is_some());

    // fast.pairs has exactly one row per task yielded by `others`, same order.
    for (other, overlap_row) in others.zip(&fast.pairs) {
        if cancel.is_cancelled() {
            return Err(TaitiError::Cancelled);
        }

        let outcome = analyzer
            .pairwise_risk(target, other, &overlap_row.conflicting_files)
            .await
            .map_err(|e| TaitiError::deep_analysis(&target.id, &other.id, format!("{e:#}")))
            .and_then(|risk| {
                risk.normalized().ok_or_else(|| {
                    TaitiError::deep_analysis(&target.id, &other.id, "analyzer returned a non-finite rate")
                })
            });

        match outcome {
            Ok(risk) => {
                total += risk.rate;
                pairs.push(PairConflict {
                    other: overlap_row.other.clone(),
                    shared_refs: overlap_row.shared_refs,
                    rate: (risk.rate * 100.0).round(),
                    source: RateSource::Deep,
                    conflicting_files: risk.conflicting_files,
                });
            }
            Err(e) => {
                warn!(analyzer = analyzer.name(), "{}", e);
                failed.push(other.id.clone());
                pairs.push(overlap_row.clone());
            }
        }
    }

    let rate = if pairs.is_empty() {
        0.0
    } else {
        (total / pairs.len() as f64 * 100.0).round()
    };
    Ok(DeepOutcome { rate, pairs, failed })
}
