//! Persisting scenario sets on tracker items.
//!
//! A scenario set lives on its item as two artifacts: an attached transfer
//! file and a marker comment. The comment is what readers look for; the
//! file holds the data. A write replaces both, a delete removes both.
//!
//! The remote side has no transactions, so a write is a short protocol:
//!
//! 1. Inspect the item and delete every existing marker comment and
//!    scenario attachment (best effort, failures are logged).
//! 2. Serialize the new set.
//! 3. Upload it.
//! 4. Post the marker comment. If this fails the upload from step 3 is
//!    deleted again so the item is left without a half-written set.
//!
//! Writes and deletes for the same item are serialized in-process.

use crate::error::{Result, TaitiError, WriteStage};
use crate::scenario::transfer;
use crate::scenario::ScenarioSet;
use crate::tracker::{Attachment, Comment, TrackerClient, TrackerError};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Text of the comment that marks an item as carrying a scenario set.
pub const MARKER_TEXT: &str = "[TAITI] Scenarios";

// =============================================================================
// File naming convention
// =============================================================================

/// How scenario attachments are named and recognized.
///
/// Recognition is a name heuristic: any attachment whose lowercased name
/// ends in `.csv` and mentions `taiti` or `scenario` is treated as a
/// scenario file. A user attachment that happens to match will be read as
/// scenarios and deleted on the next write. Keep every naming rule here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioFileConvention;

impl ScenarioFileConvention {
    /// Name for a freshly uploaded transfer file.
    #[must_use]
    pub fn file_name(&self, item_id: &str) -> String {
        format!("taiti-scenarios-{item_id}.csv")
    }

    /// Whether an attachment name looks like a scenario file.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        lower.ends_with(".csv") && (lower.contains("taiti") || lower.contains("scenario"))
    }

    /// Whether a comment is a scenario marker.
    #[must_use]
    pub fn is_marker(&self, comment: &Comment) -> bool {
        comment.text.trim() == MARKER_TEXT
    }
}

// =============================================================================
// Per-item locks
// =============================================================================

/// Registry of per-item async locks.
///
/// An entry lives only while some caller holds or waits for it.
#[derive(Debug, Default)]
struct ItemLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ItemLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive access to `item_id`.
    async fn acquire(&self, item_id: &str) -> ItemGuard<'_> {
        let lock = self
            .map()
            .entry(item_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let mut lease = ItemGuard {
            registry: self,
            item_id: item_id.to_string(),
            guard: None,
        };
        lease.guard = Some(lock.lock_owned().await);
        lease
    }

    /// Forget `item_id` unless another caller still holds its lock.
    fn release(&self, item_id: &str) {
        let mut locks = self.map();
        if locks
            .get(item_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(item_id);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.map().len()
    }
}

/// Exclusive access to one item. Dropping it unlocks the item.
struct ItemGuard<'a> {
    registry: &'a ItemLocks,
    item_id: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for ItemGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.registry.release(&self.item_id);
    }
}

// =============================================================================
// ScenarioSync
// =============================================================================

/// Outcome of a best-effort cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub comments_deleted: usize,
    pub attachments_deleted: usize,
    /// Human-readable description of each deletion that failed.
    pub failures: Vec<String>,
}

impl CleanupReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Reads, writes and deletes scenario sets on tracker items.
pub struct ScenarioSync {
    tracker: Arc<dyn TrackerClient>,
    convention: ScenarioFileConvention,
    locks: ItemLocks,
}

impl ScenarioSync {
    pub fn new(tracker: Arc<dyn TrackerClient>) -> Self {
        Self {
            tracker,
            convention: ScenarioFileConvention,
            locks: ItemLocks::default(),
        }
    }

    /// The tracker this sync talks to.
    pub fn tracker(&self) -> &Arc<dyn TrackerClient> {
        &self.tracker
    }

    /// Fetch an item's scenario set.
    ///
    /// Returns `Ok(None)` when the item has no marker comment, or has one
    /// but no matching attachment. An empty attached file yields
    /// `Ok(Some(empty))`. Malformed entries next to valid ones are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`TaitiError::ItemScenarioRead`] when listing, downloading or
    /// decoding fails, or when the file has content but not a single valid
    /// entry.
    pub async fn read(&self, item_id: &str) -> Result<Option<ScenarioSet>> {
        let comments = self
            .tracker
            .comments(item_id)
            .await
            .map_err(|e| TaitiError::item_read(item_id, e.to_string()))?;

        if !comments.iter().any(|c| self.convention.is_marker(c)) {
            return Ok(None);
        }

        let attachments = self
            .tracker
            .attachments(item_id)
            .await
            .map_err(|e| TaitiError::item_read(item_id, e.to_string()))?;

        let Some(attachment) = attachments
            .iter()
            .rev()
            .find(|a| self.convention.matches(&a.name))
        else {
            warn!(item_id, "Marker comment present but no scenario attachment found");
            return Ok(None);
        };

        let bytes = self
            .tracker
            .download_attachment(attachment)
            .await
            .map_err(|e| TaitiError::item_read(item_id, e.to_string()))?;

        let text = String::from_utf8(bytes).map_err(|e| {
            TaitiError::item_read(item_id, format!("{} is not valid UTF-8: {e}", attachment.name))
        })?;

        let parsed = transfer::parse(&text);
        if parsed.scenarios.is_empty() && !parsed.skipped.is_empty() {
            return Err(TaitiError::item_read(
                item_id,
                format!(
                    "{} has no valid entries ({} skipped, first: {})",
                    attachment.name,
                    parsed.skipped.len(),
                    parsed.skipped[0]
                ),
            ));
        }
        for skipped in &parsed.skipped {
            warn!(item_id, attachment = %attachment.name, "Skipped malformed entry: {}", skipped);
        }
        debug!(
            item_id,
            scenarios = parsed.scenarios.len(),
            "Read scenario set"
        );
        Ok(Some(parsed.scenarios))
    }

    /// Replace an item's scenario set.
    ///
    /// # Errors
    ///
    /// - [`TaitiError::ScenarioWrite`] when the write failed and nothing new
    ///   was left on the item.
    /// - [`TaitiError::ScenarioWriteInconsistent`] when the marker comment
    ///   failed and the uploaded file could not be removed.
    pub async fn write(&self, item_id: &str, scenarios: &ScenarioSet) -> Result<()> {
        let _guard = self.locks.acquire(item_id).await;

        let cleanup = self
            .remove_existing(item_id)
            .await
            .map_err(|e| TaitiError::write(item_id, WriteStage::Inspect, e.to_string()))?;
        log_cleanup(item_id, &cleanup);

        let body = transfer::encode(scenarios);

        let file_name = self.convention.file_name(item_id);
        let attachment = self
            .tracker
            .upload_attachment(item_id, &file_name, body.into_bytes())
            .await
            .map_err(|e| TaitiError::write(item_id, WriteStage::Upload, e.to_string()))?;

        if let Err(comment_err) = self.tracker.post_comment(item_id, MARKER_TEXT).await {
            return Err(self.roll_back_upload(item_id, &attachment, &comment_err).await);
        }

        info!(
            item_id,
            attachment = %attachment.name,
            scenarios = scenarios.len(),
            "Saved scenario set"
        );
        Ok(())
    }

    /// Remove an item's scenario set. Removing a set that does not exist
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`TaitiError::ScenarioWrite`] (stage `Inspect`) when the
    /// item's comments or attachments cannot be listed. Individual deletion
    /// failures are logged, not returned.
    pub async fn delete(&self, item_id: &str) -> Result<CleanupReport> {
        let _guard = self.locks.acquire(item_id).await;

        let cleanup = self
            .remove_existing(item_id)
            .await
            .map_err(|e| TaitiError::write(item_id, WriteStage::Inspect, e.to_string()))?;
        log_cleanup(item_id, &cleanup);
        Ok(cleanup)
    }

    /// Delete every marker comment and scenario attachment on an item.
    async fn remove_existing(&self, item_id: &str) -> std::result::Result<CleanupReport, TrackerError> {
        let comments = self.tracker.comments(item_id).await?;
        let attachments = self.tracker.attachments(item_id).await?;

        let markers: Vec<&Comment> = comments
            .iter()
            .filter(|c| self.convention.is_marker(c))
            .collect();
        let files: Vec<&Attachment> = attachments
            .iter()
            .filter(|a| self.convention.matches(&a.name))
            .collect();

        let comment_results = join_all(
            markers
                .iter()
                .map(|c| self.tracker.delete_comment(&c.id)),
        )
        .await;
        let attachment_results = join_all(
            files
                .iter()
                .map(|a| self.tracker.delete_attachment(item_id, &a.id)),
        )
        .await;

        let mut report = CleanupReport::default();
        for (comment, result) in markers.iter().zip(comment_results) {
            match result {
                Ok(()) => report.comments_deleted += 1,
                Err(e) => report
                    .failures
                    .push(format!("comment {}: {}", comment.id, e)),
            }
        }
        for (attachment, result) in files.iter().zip(attachment_results) {
            match result {
                Ok(()) => report.attachments_deleted += 1,
                Err(e) => report
                    .failures
                    .push(format!("attachment {}: {}", attachment.id, e)),
            }
        }
        Ok(report)
    }

    async fn roll_back_upload(
        &self,
        item_id: &str,
        attachment: &Attachment,
        comment_err: &TrackerError,
    ) -> TaitiError {
        warn!(
            item_id,
            attachment_id = %attachment.id,
            "Marker comment failed, removing uploaded attachment: {}",
            comment_err
        );
        match self.tracker.delete_attachment(item_id, &attachment.id).await {
            Ok(()) => TaitiError::write(item_id, WriteStage::Comment, comment_err.to_string()),
            Err(rollback_err) => TaitiError::ScenarioWriteInconsistent {
                item_id: item_id.to_string(),
                attachment_id: attachment.id.clone(),
                reason: comment_err.to_string(),
                rollback_error: rollback_err.to_string(),
            },
        }
    }
}

fn log_cleanup(item_id: &str, report: &CleanupReport) {
    if report.comments_deleted + report.attachments_deleted > 0 {
        debug!(
            item_id,
            comments = report.comments_deleted,
            attachments = report.attachments_deleted,
            "Removed previous scenario artifacts"
        );
    }
    for failure in &report.failures {
        warn!(item_id, "Could not remove previous scenario artifact: {}", failure);
    }
}
