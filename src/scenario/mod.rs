//! Scenario references and scenario sets.
//!
//! A scenario is one line in one source file (usually a `Scenario:` line in
//! a `.feature` file) that a user has tied to a work item. A [`ScenarioSet`]
//! is the unit that gets persisted on the tracker and compared between
//! tasks.
//!
//! # Example
//!
//! ```rust
//! use taiti::scenario::{ScenarioReference, ScenarioSet};
//!
//! let mut set = ScenarioSet::new();
//! set.insert(ScenarioReference::new("features/login.feature", 12));
//! set.insert(ScenarioReference::new("features/login.feature", 40));
//! assert!(!set.insert(ScenarioReference::new("features/login.feature", 12)));
//! assert_eq!(set.len(), 2);
//! ```

pub mod feature;
pub mod transfer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single `(file, line)` reference. Immutable; equality is by both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenarioReference {
    pub file_path: String,
    pub line: u32,
}

impl ScenarioReference {
    #[must_use]
    pub fn new(file_path: impl Into<String>, line: u32) -> Self {
        Self {
            file_path: file_path.into(),
            line,
        }
    }

    /// Parse the `path:line` shorthand used on the command line.
    ///
    /// The line number is taken after the last `:` so Windows drive letters
    /// survive.
    pub fn parse_shorthand(text: &str) -> Option<Self> {
        let (path, line) = text.trim().rsplit_once(':')?;
        let line = line.trim().parse::<u32>().ok()?;
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        Some(Self::new(path, line))
    }
}

impl std::fmt::Display for ScenarioReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_path, self.line)
    }
}

/// All selected lines of one file, in selection order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub path: String,
    pub lines: Vec<u32>,
}

/// Duplicate-free collection of scenario references grouped by file.
///
/// File order follows first insertion and is what the transfer format
/// writes out. Comparison ignores ordering: two sets are equal when they
/// hold the same references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioSet {
    files: Vec<ScenarioFile>,
}

impl ScenarioSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference. Returns `false` if it was already present.
    pub fn insert(&mut self, reference: ScenarioReference) -> bool {
        match self.files.iter_mut().find(|f| f.path == reference.file_path) {
            Some(file) => {
                if file.lines.contains(&reference.line) {
                    false
                } else {
                    file.lines.push(reference.line);
                    true
                }
            }
            None => {
                self.files.push(ScenarioFile {
                    path: reference.file_path,
                    lines: vec![reference.line],
                });
                true
            }
        }
    }

    /// Remove a reference. Files left without lines are dropped.
    pub fn remove(&mut self, reference: &ScenarioReference) -> bool {
        let Some(idx) = self.files.iter().position(|f| f.path == reference.file_path) else {
            return false;
        };
        let file = &mut self.files[idx];
        let before = file.lines.len();
        file.lines.retain(|l| *l != reference.line);
        let removed = file.lines.len() != before;
        if file.lines.is_empty() {
            self.files.remove(idx);
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, reference: &ScenarioReference) -> bool {
        self.lines_for(&reference.file_path)
            .is_some_and(|lines| lines.contains(&reference.line))
    }

    /// Lines selected in `path`, if the file is part of the set.
    #[must_use]
    pub fn lines_for(&self, path: &str) -> Option<&[u32]> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.lines.as_slice())
    }

    /// Number of references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.iter().map(|f| f.lines.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.iter().all(|f| f.lines.is_empty())
    }

    /// Files in insertion order.
    #[must_use]
    pub fn files(&self) -> &[ScenarioFile] {
        &self.files
    }

    /// Iterate over references in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = ScenarioReference> + '_ {
        self.files.iter().flat_map(|f| {
            f.lines
                .iter()
                .map(move |line| ScenarioReference::new(f.path.clone(), *line))
        })
    }

    /// References present in both sets, grouped by file in `self`'s order.
    ///
    /// The relation is symmetric as a set: `a.shared_with(b)` and
    /// `b.shared_with(a)` contain the same references.
    #[must_use]
    pub fn shared_with(&self, other: &ScenarioSet) -> Vec<ScenarioFile> {
        self.files
            .iter()
            .filter_map(|file| {
                let other_lines = other.lines_for(&file.path)?;
                let lines: Vec<u32> = file
                    .lines
                    .iter()
                    .copied()
                    .filter(|l| other_lines.contains(l))
                    .collect();
                (!lines.is_empty()).then(|| ScenarioFile {
                    path: file.path.clone(),
                    lines,
                })
            })
            .collect()
    }

    /// Order-independent view used for comparison.
    #[must_use]
    pub fn to_sorted(&self) -> BTreeSet<ScenarioReference> {
        self.iter().collect()
    }
}

impl PartialEq for ScenarioSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|r| other.contains(&r))
    }
}

impl Eq for ScenarioSet {}

impl FromIterator<ScenarioReference> for ScenarioSet {
    fn from_iter<I: IntoIterator<Item = ScenarioReference>>(iter: I) -> Self {
        let mut set = Self::new();
        for reference in iter {
            set.insert(reference);
        }
        set
    }
}

impl Extend<ScenarioReference> for ScenarioSet {
    fn extend<I: IntoIterator<Item = ScenarioReference>>(&mut self, iter: I) {
        for reference in iter {
            self.insert(reference);
        }
    }
}
