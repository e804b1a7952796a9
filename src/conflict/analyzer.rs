//! Code-level conflict analysis capability.
//!
//! Deep analysis (cloning the repository, mining history, mapping scenarios
//! to the code they exercise) happens outside this crate. The scorer only
//! needs a pairwise risk number and the files behind it.

use crate::task::Task;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of analysing one pair of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseRisk {
    /// Relative conflict risk, `0.0..=1.0`.
    pub rate: f64,
    /// Files both tasks are expected to change.
    pub conflicting_files: Vec<String>,
}

impl PairwiseRisk {
    #[must_use]
    pub fn new(rate: f64, conflicting_files: Vec<String>) -> Self {
        Self {
            rate,
            conflicting_files,
        }
    }

    /// A pair with no risk at all.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0.0, Vec::new())
    }

    /// Clamp the rate into `0.0..=1.0`; a non-finite rate becomes `None`.
    #[must_use]
    pub fn normalized(mut self) -> Option<Self> {
        if !self.rate.is_finite() {
            return None;
        }
        self.rate = self.rate.clamp(0.0, 1.0);
        Some(self)
    }
}

/// Computes code-level conflict risk between two tasks.
///
/// Calls may be slow (a clone and a history walk per pair) and may fail.
/// A failure only affects that pair's contribution.
#[async_trait]
pub trait CodeConflictAnalyzer: Send + Sync {
    /// Risk that `target` and `other` will conflict when both are merged.
    ///
    /// `focus_files` lists the scenario files the two tasks share, which is
    /// a hint of where to look first. It may be empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the analysis cannot be completed for this pair.
    async fn pairwise_risk(
        &self,
        target: &Task,
        other: &Task,
        focus_files: &[String],
    ) -> Result<PairwiseRisk>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "code-conflict-analyzer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_clamps() {
        assert_eq!(PairwiseRisk::new(1.7, vec![]).normalized().unwrap().rate, 1.0);
        assert_eq!(PairwiseRisk::new(-0.2, vec![]).normalized().unwrap().rate, 0.0);
        assert_eq!(PairwiseRisk::new(0.25, vec![]).normalized().unwrap().rate, 0.25);
    }

    #[test]
    fn test_normalized_rejects_nan() {
        assert!(PairwiseRisk::new(f64::NAN, vec![]).normalized().is_none());
        assert!(PairwiseRisk::new(f64::INFINITY, vec![]).normalized().is_none());
    }

    #[test]
    fn test_analyzer_is_object_safe() {
        fn assert_object_safe(_: Option<&dyn CodeConflictAnalyzer>) {}
        assert_object_safe(None);
    }
}
