//! Custom error types for TAITI.
//!
//! This module provides the engine's error taxonomy. Per-item failures
//! (one card's scenarios, one analyzer pair) are recoverable and are
//! downgraded by the pass that hits them; whole-pass failures propagate
//! to the caller as a single terminal error.

use std::path::PathBuf;
use thiserror::Error;

use crate::tracker::TrackerError;

/// Main error type for TAITI operations
#[derive(Error, Debug)]
pub enum TaitiError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Tracker Errors
    // =========================================================================
    /// The tracker could not be reached or refused the credentials.
    /// Fatal to a classification pass.
    #[error("Tracker unreachable during {operation}{}: {message}", status_suffix(.status))]
    TrackerConnectivity {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    /// One item's scenario set could not be fetched or parsed.
    #[error("Could not read scenarios for item {item_id}: {reason}")]
    ItemScenarioRead { item_id: String, reason: String },

    // =========================================================================
    // Scenario Write Errors
    // =========================================================================
    /// A write failed and the remote state is consistent (nothing was left
    /// behind). Safe to report and retry.
    #[error("Failed to save scenarios for item {item_id} ({stage}): {reason}")]
    ScenarioWrite {
        item_id: String,
        stage: WriteStage,
        reason: String,
    },

    /// The marker comment could not be posted and the uploaded attachment
    /// could not be removed either. The item now carries an orphaned file.
    #[error(
        "Scenarios for item {item_id} are in an inconsistent state: attachment {attachment_id} \
         was uploaded but the marker comment failed ({reason}) and removing the attachment \
         also failed ({rollback_error})"
    )]
    ScenarioWriteInconsistent {
        item_id: String,
        attachment_id: String,
        reason: String,
        rollback_error: String,
    },

    // =========================================================================
    // Scoring Errors
    // =========================================================================
    /// One pairwise code-conflict computation failed.
    #[error("Conflict analysis failed for {task_id} vs {other_id}: {reason}")]
    DeepAnalysis {
        task_id: String,
        other_id: String,
        reason: String,
    },

    /// Cooperative cancellation was observed; partial results were discarded.
    #[error("Operation cancelled")]
    Cancelled,

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// The Write protocol step that was running when a write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    /// Listing the existing marker comments and attachments.
    Inspect,
    /// Uploading the transfer file.
    Upload,
    /// Posting the marker comment (the upload was rolled back).
    Comment,
}

impl std::fmt::Display for WriteStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inspect => write!(f, "inspect"),
            Self::Upload => write!(f, "upload"),
            Self::Comment => write!(f, "comment"),
        }
    }
}

impl TaitiError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Map a tracker failure into a connectivity error.
    pub fn connectivity(operation: impl Into<String>, err: &TrackerError) -> Self {
        Self::TrackerConnectivity {
            operation: operation.into(),
            status: err.status,
            message: err.message.clone(),
        }
    }

    /// Create a per-item scenario read error
    pub fn item_read(item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ItemScenarioRead {
            item_id: item_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a scenario write error
    pub fn write(item_id: impl Into<String>, stage: WriteStage, reason: impl Into<String>) -> Self {
        Self::ScenarioWrite {
            item_id: item_id.into(),
            stage,
            reason: reason.into(),
        }
    }

    /// Create a deep analysis error
    pub fn deep_analysis(
        task_id: impl Into<String>,
        other_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DeepAnalysis {
            task_id: task_id.into(),
            other_id: other_id.into(),
            reason: reason.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is recoverable (degraded locally, the pass continues)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ItemScenarioRead { .. } | Self::DeepAnalysis { .. } | Self::ScenarioWrite { .. }
        )
    }

    /// Check if this error is fatal (aborts a whole pass)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TrackerConnectivity { .. }
                | Self::Config { .. }
                | Self::InvalidConfig { .. }
                | Self::Cancelled
        )
    }

    /// Check if the user must be warned that remote state was left inconsistent
    pub fn requires_user_warning(&self) -> bool {
        matches!(self, Self::ScenarioWriteInconsistent { .. })
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::TrackerConnectivity { .. } => 2,
            Self::ScenarioWriteInconsistent { .. } => 3,
            Self::ScenarioWrite { .. } => 4,
            Self::Cancelled => 130,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for TAITI results
pub type Result<T> = std::result::Result<T, TaitiError>;

/// Extension trait for converting foreign errors to TaitiError
pub trait IntoTaitiError<T> {
    fn into_taiti_config(self) -> Result<T>;
    fn into_item_read(self, item_id: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoTaitiError<T> for std::result::Result<T, E> {
    fn into_taiti_config(self) -> Result<T> {
        self.map_err(|e| TaitiError::config(e.into().to_string()))
    }

    fn into_item_read(self, item_id: &str) -> Result<T> {
        self.map_err(|e| TaitiError::item_read(item_id, e.into().to_string()))
    }
}
