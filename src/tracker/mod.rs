//! Issue tracker capability.
//!
//! The engine never talks HTTP itself. Everything it needs from a tracker
//! goes through [`TrackerClient`], which is object-safe so a board can be
//! driven by the Trello adapter in production and by
//! [`MockTracker`](crate::testing::MockTracker) in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use taiti::tracker::{TrackerClient, trello::TrelloClient};
//!
//! let client: Arc<dyn TrackerClient> = Arc::new(TrelloClient::new(credentials)?);
//! let me = client.authenticated_user_id().await?;
//! let cards = client.list_items("board-id").await?;
//! ```

pub mod trello;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a tracker call.
///
/// Only success/failure and the numeric status (when the transport has one)
/// are inspected by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed{}: {message}", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
pub struct TrackerError {
    pub operation: String,
    pub status: Option<u16>,
    pub message: String,
}

impl TrackerError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(operation: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Credentials were rejected.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self.status, Some(401 | 403))
    }

    /// The target no longer exists.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// A work item as the tracker reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Tracker list / workflow state the item sits in.
    pub state_id: String,
    /// Human-readable name of that state, when the tracker resolved it.
    pub state_name: Option<String>,
    pub member_ids: Vec<String>,
    pub description: String,
    pub labels: Vec<String>,
}

/// A comment on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    /// The tracker hinted that the comment references an attachment.
    pub has_attachment_hint: bool,
}

/// A file attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Operations the engine needs from an issue tracker.
///
/// Every call is a network round trip from the engine's point of view and
/// may fail independently.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// List every item visible in `scope_id` (a board or project).
    ///
    /// Pagination, if any, is handled inside the implementation.
    async fn list_items(&self, scope_id: &str) -> TrackerResult<Vec<RawItem>>;

    /// Comments on an item, oldest first.
    async fn comments(&self, item_id: &str) -> TrackerResult<Vec<Comment>>;

    /// Attachments on an item, oldest first.
    async fn attachments(&self, item_id: &str) -> TrackerResult<Vec<Attachment>>;

    /// Upload a file and attach it to an item.
    async fn upload_attachment(
        &self,
        item_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> TrackerResult<Attachment>;

    /// Post a comment on an item.
    async fn post_comment(&self, item_id: &str, text: &str) -> TrackerResult<Comment>;

    /// Delete a comment.
    async fn delete_comment(&self, comment_id: &str) -> TrackerResult<()>;

    /// Delete an attachment from an item.
    async fn delete_attachment(&self, item_id: &str, attachment_id: &str) -> TrackerResult<()>;

    /// Id of the member the credentials belong to.
    async fn authenticated_user_id(&self) -> TrackerResult<String>;

    /// Fetch an attachment's contents.
    async fn download_attachment(&self, attachment: &Attachment) -> TrackerResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_error_display() {
        let err = TrackerError::with_status("GET /boards/b1/cards", 401, "invalid key");
        assert_eq!(
            err.to_string(),
            "GET /boards/b1/cards failed with status 401: invalid key"
        );
        let err = TrackerError::new("upload", "connection reset");
        assert_eq!(err.to_string(), "upload failed: connection reset");
    }

    #[test]
    fn test_tracker_error_classification() {
        assert!(TrackerError::with_status("x", 401, "").is_auth());
        assert!(TrackerError::with_status("x", 403, "").is_auth());
        assert!(!TrackerError::with_status("x", 500, "").is_auth());
        assert!(TrackerError::with_status("x", 404, "").is_not_found());
        assert!(!TrackerError::new("x", "").is_not_found());
    }

    #[test]
    fn test_tracker_client_is_object_safe() {
        fn assert_object_safe(_: Option<&dyn TrackerClient>) {}
        assert_object_safe(None);
    }
}
