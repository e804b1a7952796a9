//! Configuration management for TAITI.
//!
//! Settings live in `.taiti/settings.json` under the project directory.
//! Every field is optional; a missing file yields the defaults.
//!
//! # Example settings.json
//!
//! ```json
//! {
//!   "tracker": {
//!     "board": "https://trello.com/b/AbC123xy/sprint-board",
//!     "apiKey": "...",
//!     "token": "..."
//!   },
//!   "buckets": {
//!     "unstarted": ["TODO", "Backlog"],
//!     "started": ["DOING", "Review"]
//!   },
//!   "scenarios": {
//!     "featuresDir": "features"
//!   }
//! }
//! ```

use crate::classify::{BucketRules, DEFAULT_STARTED_LISTS, DEFAULT_UNSTARTED_LISTS};
use crate::error::{Result, TaitiError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Environment variable overriding `tracker.apiKey`.
pub const ENV_API_KEY: &str = "TAITI_TRELLO_KEY";
/// Environment variable overriding `tracker.token`.
pub const ENV_TOKEN: &str = "TAITI_TRELLO_TOKEN";
/// Environment variable overriding `tracker.board`.
pub const ENV_BOARD: &str = "TAITI_BOARD";

/// Tracker connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSettings {
    /// Board URL or bare board id.
    #[serde(default)]
    pub board: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub token: Option<String>,
}

/// Which tracker lists feed which bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSettings {
    #[serde(default = "default_unstarted")]
    pub unstarted: Vec<String>,

    #[serde(default = "default_started")]
    pub started: Vec<String>,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            unstarted: default_unstarted(),
            started: default_started(),
        }
    }
}

fn default_unstarted() -> Vec<String> {
    DEFAULT_UNSTARTED_LISTS.iter().map(|s| s.to_string()).collect()
}

fn default_started() -> Vec<String> {
    DEFAULT_STARTED_LISTS.iter().map(|s| s.to_string()).collect()
}

/// Where scenario and test sources live in the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSettings {
    #[serde(default = "default_features_dir")]
    pub features_dir: String,

    #[serde(default = "default_step_definitions_dir")]
    pub step_definitions_dir: String,

    #[serde(default = "default_unit_test_dir")]
    pub unit_test_dir: String,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            features_dir: default_features_dir(),
            step_definitions_dir: default_step_definitions_dir(),
            unit_test_dir: default_unit_test_dir(),
        }
    }
}

fn default_features_dir() -> String {
    "features".to_string()
}

fn default_step_definitions_dir() -> String {
    "features/step_definitions".to_string()
}

fn default_unit_test_dir() -> String {
    "spec".to_string()
}

/// Options forwarded to a code-level conflict analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSettings {
    /// Repository the analyzer clones.
    #[serde(default)]
    pub github_url: Option<String>,

    #[serde(default)]
    pub structural_dependencies: bool,

    #[serde(default)]
    pub logical_dependencies: bool,
}

/// Project configuration loaded from .taiti/settings.json
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaitiConfig {
    #[serde(default)]
    pub tracker: TrackerSettings,

    #[serde(default)]
    pub buckets: BucketSettings,

    #[serde(default)]
    pub scenarios: ScenarioSettings,

    #[serde(default)]
    pub analysis: AnalysisSettings,
}

impl TaitiConfig {
    /// Load configuration from a project directory
    ///
    /// # Errors
    ///
    /// Returns [`TaitiError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let settings_path = Self::settings_path(project_dir);

        if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path).map_err(|e| {
                TaitiError::config_with_path(format!("failed to read: {e}"), settings_path.clone())
            })?;
            serde_json::from_str(&content).map_err(|e| {
                TaitiError::config_with_path(format!("failed to parse: {e}"), settings_path)
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Write configuration to a project directory, creating `.taiti/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let settings_path = Self::settings_path(project_dir);
        if let Some(parent) = settings_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Get the settings.json path for a project
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".taiti/settings.json")
    }

    /// Get the features directory for a project
    pub fn features_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.scenarios.features_dir)
    }

    /// Apply `TAITI_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = get(ENV_API_KEY) {
            self.tracker.api_key = Some(key);
        }
        if let Some(token) = get(ENV_TOKEN) {
            self.tracker.token = Some(token);
        }
        if let Some(board) = get(ENV_BOARD) {
            self.tracker.board = Some(board);
        }
        self
    }

    /// Bucket rules for classification.
    pub fn bucket_rules(&self) -> BucketRules {
        BucketRules::new(self.buckets.unstarted.clone(), self.buckets.started.clone())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TaitiError::InvalidConfig`] if:
    /// - Either bucket has no lists
    /// - A bucket entry is blank
    /// - The same list is claimed by both buckets
    pub fn validate(&self) -> Result<()> {
        for (field, lists) in [
            ("buckets.unstarted", &self.buckets.unstarted),
            ("buckets.started", &self.buckets.started),
        ] {
            if lists.is_empty() {
                return Err(invalid(field, "at least one list is required"));
            }
            if lists.iter().any(|l| l.trim().is_empty()) {
                return Err(invalid(field, "list names must not be blank"));
            }
        }

        let unstarted: HashSet<String> = self
            .buckets
            .unstarted
            .iter()
            .map(|l| l.trim().to_lowercase())
            .collect();
        if let Some(both) = self
            .buckets
            .started
            .iter()
            .find(|l| unstarted.contains(&l.trim().to_lowercase()))
        {
            return Err(invalid(
                "buckets",
                format!("list '{both}' is both unstarted and started"),
            ));
        }

        if self.scenarios.features_dir.trim().is_empty() {
            return Err(invalid("scenarios.featuresDir", "must not be empty"));
        }

        Ok(())
    }

    /// Check that tracker credentials and board are present.
    ///
    /// # Errors
    ///
    /// Returns [`TaitiError::Config`] naming the first missing setting.
    pub fn require_tracker(&self) -> Result<(&str, &str, &str)> {
        let missing = |name: &str, env: &str| {
            TaitiError::config(format!(
                "tracker.{name} is not set (settings.json or {env})"
            ))
        };
        let board = self
            .tracker
            .board
            .as_deref()
            .ok_or_else(|| missing("board", ENV_BOARD))?;
        let key = self
            .tracker
            .api_key
            .as_deref()
            .ok_or_else(|| missing("apiKey", ENV_API_KEY))?;
        let token = self
            .tracker
            .token
            .as_deref()
            .ok_or_else(|| missing("token", ENV_TOKEN))?;
        Ok((board, key, token))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> TaitiError {
    TaitiError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = TaitiConfig::default();
        assert_eq!(config.buckets.unstarted, vec!["TODO", "Backlog", "Unstarted"]);
        assert_eq!(config.buckets.started, vec!["DOING"]);
        assert_eq!(config.scenarios.features_dir, "features");
        assert_eq!(config.scenarios.step_definitions_dir, "features/step_definitions");
        assert_eq!(config.scenarios.unit_test_dir, "spec");
        assert!(!config.analysis.structural_dependencies);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_missing() {
        let temp = TempDir::new().unwrap();
        let config = TaitiConfig::load(temp.path()).unwrap();
        assert_eq!(config, TaitiConfig::default());
    }

    #[test]
    fn test_config_load_partial() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".taiti")).unwrap();
        std::fs::write(
            temp.path().join(".taiti/settings.json"),
            r#"{
                "tracker": { "board": "AbC123xy", "apiKey": "k" },
                "buckets": { "started": ["In Progress"] },
                "analysis": { "githubUrl": "https://github.com/acme/shop", "logicalDependencies": true }
            }"#,
        )
        .unwrap();

        let config = TaitiConfig::load(temp.path()).unwrap();
        assert_eq!(config.tracker.board.as_deref(), Some("AbC123xy"));
        assert_eq!(config.tracker.api_key.as_deref(), Some("k"));
        assert_eq!(config.tracker.token, None);
        assert_eq!(config.buckets.unstarted, vec!["TODO", "Backlog", "Unstarted"]);
        assert_eq!(config.buckets.started, vec!["In Progress"]);
        assert!(config.analysis.logical_dependencies);
        assert_eq!(config.scenarios.features_dir, "features");
    }

    #[test]
    fn test_config_load_invalid_json() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".taiti")).unwrap();
        std::fs::write(temp.path().join(".taiti/settings.json"), "{ not json").unwrap();

        let err = TaitiConfig::load(temp.path()).unwrap_err();
        assert!(matches!(err, TaitiError::Config { path: Some(_), .. }));
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_config_save_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut config = TaitiConfig::default();
        config.tracker.board = Some("AbC123xy".into());
        config.save(temp.path()).unwrap();

        let loaded = TaitiConfig::load(temp.path()).unwrap();
        assert_eq!(loaded, config);
        let raw = std::fs::read_to_string(TaitiConfig::settings_path(temp.path())).unwrap();
        assert!(raw.contains("featuresDir"));
    }

    #[test]
    fn test_validate_rejects_overlapping_buckets() {
        let mut config = TaitiConfig::default();
        config.buckets.started.push("todo".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'todo'"));
    }

    #[test]
    fn test_validate_rejects_empty_buckets() {
        let mut config = TaitiConfig::default();
        config.buckets.started.clear();
        assert!(matches!(
            config.validate(),
            Err(TaitiError::InvalidConfig { field, .. }) if field == "buckets.started"
        ));

        let mut config = TaitiConfig::default();
        config.buckets.unstarted = vec!["  ".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = TaitiConfig::default().with_overrides_from(|name| match name {
            ENV_API_KEY => Some("env-key".into()),
            ENV_TOKEN => Some("".into()),
            _ => None,
        });
        assert_eq!(config.tracker.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.tracker.token, None);
    }

    #[test]
    fn test_require_tracker() {
        let mut config = TaitiConfig::default();
        let err = config.require_tracker().unwrap_err();
        assert!(err.to_string().contains("tracker.board"));

        config.tracker = TrackerSettings {
            board: Some("b".into()),
            api_key: Some("k".into()),
            token: Some("t".into()),
        };
        assert_eq!(config.require_tracker().unwrap(), ("b", "k", "t"));
    }

    #[test]
    fn test_bucket_rules_from_config() {
        let config = TaitiConfig::default();
        let rules = config.bucket_rules();
        assert_eq!(rules, BucketRules::default());
    }
}
