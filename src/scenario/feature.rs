//! Helpers for Gherkin `.feature` files.
//!
//! Scenario references only carry a path and a line number; these helpers
//! recover something readable for display and let callers pick scenarios by
//! title instead of by line.

use super::{ScenarioReference, ScenarioSet};
use anyhow::{Context, Result};
use std::path::Path;

const SCENARIO_KEYWORDS: &[&str] = &["scenario outline:", "scenario template:", "scenario:", "example:"];

/// A scenario declaration found in a feature file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureScenario {
    pub line: u32,
    pub title: String,
}

/// Check whether a line declares a scenario.
#[must_use]
pub fn is_scenario_line(line: &str) -> bool {
    let lower = line.trim_start().to_lowercase();
    SCENARIO_KEYWORDS.iter().any(|k| lower.starts_with(k))
}

/// List every scenario declaration in feature file text.
#[must_use]
pub fn scenarios_in(text: &str) -> Vec<FeatureScenario> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| is_scenario_line(line))
        .map(|(idx, line)| FeatureScenario {
            line: idx as u32 + 1,
            title: line.trim().to_string(),
        })
        .collect()
}

/// Text shown for the line a reference points at.
///
/// Returns the trimmed source line, or `Scenario at line: N` when the line
/// does not exist in `text`.
#[must_use]
pub fn title_at(text: &str, line: u32) -> String {
    line.checked_sub(1)
        .and_then(|idx| text.lines().nth(idx as usize))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Scenario at line: {line}"))
}

/// Resolve a reference's title from disk, relative to `root` when the path
/// is not absolute.
#[must_use]
pub fn title_for(root: &Path, reference: &ScenarioReference) -> String {
    let path = root.join(&reference.file_path);
    match std::fs::read_to_string(&path) {
        Ok(text) => title_at(&text, reference.line),
        Err(e) => {
            tracing::debug!("Could not read {}: {}", path.display(), e);
            format!("Scenario at line: {}", reference.line)
        }
    }
}

/// Select every scenario of a feature file on disk.
///
/// The reference paths keep `file` exactly as given so they match what other
/// users selected for the same project layout.
pub fn select_all(root: &Path, file: &str) -> Result<ScenarioSet> {
    let path = root.join(file);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read feature file {}", path.display()))?;
    Ok(scenarios_in(&text)
        .into_iter()
        .map(|s| ScenarioReference::new(file, s.line))
        .collect())
}
