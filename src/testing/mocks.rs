//! Mock implementations of the engine's capabilities.
//!
//! These mocks provide controllable test doubles for the tracker and the
//! code-level analyzer, enabling deterministic tests of the sync protocol,
//! classification and scoring without a network.

use crate::conflict::{CodeConflictAnalyzer, PairwiseRisk};
use crate::progress::ProgressReporter;
use crate::scenario::{transfer, ScenarioSet};
use crate::sync::{ScenarioFileConvention, MARKER_TEXT};
use crate::task::Task;
use crate::tracker::{
    Attachment, Comment, RawItem, TrackerClient, TrackerError, TrackerResult,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

// =============================================================================
// MockTracker
// =============================================================================

/// A tracker operation, used for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerOp {
    ListItems,
    Comments,
    Attachments,
    UploadAttachment,
    PostComment,
    DeleteComment,
    DeleteAttachment,
    AuthenticatedUser,
    DownloadAttachment,
}

impl std::fmt::Display for TrackerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ListItems => "list_items",
            Self::Comments => "comments",
            Self::Attachments => "attachments",
            Self::UploadAttachment => "upload_attachment",
            Self::PostComment => "post_comment",
            Self::DeleteComment => "delete_comment",
            Self::DeleteAttachment => "delete_attachment",
            Self::AuthenticatedUser => "authenticated_user_id",
            Self::DownloadAttachment => "download_attachment",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
struct StoredAttachment {
    attachment: Attachment,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct BoardState {
    lists: HashMap<String, String>,
    items: Vec<RawItem>,
    comments: HashMap<String, Vec<Comment>>,
    attachments: HashMap<String, Vec<StoredAttachment>>,
    current_user: String,
    next_id: u64,
    failures: HashSet<TrackerOp>,
    item_failures: HashSet<(String, TrackerOp)>,
    calls: HashMap<TrackerOp, u32>,
    journal: Vec<String>,
}

impl BoardState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn has_item(&self, item_id: &str) -> bool {
        self.items.iter().any(|i| i.id == item_id)
    }

    /// Count the call and return an injected failure if one is set.
    fn enter(&mut self, op: TrackerOp, item_id: Option<&str>) -> TrackerResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        self.journal.push(match item_id {
            Some(id) => format!("{op} {id}"),
            None => op.to_string(),
        });

        let item_failed =
            item_id.is_some_and(|id| self.item_failures.contains(&(id.to_string(), op)));
        if self.failures.contains(&op) || item_failed {
            return Err(TrackerError::with_status(op.to_string(), 500, "injected failure"));
        }
        Ok(())
    }
}

/// In-memory tracker board.
///
/// Comments and attachments behave like the real thing: uploads get fresh
/// ids, deletes remove them, and listing returns them oldest first.
/// Any operation can be made to fail, globally or for one item.
///
/// # Example
///
/// ```rust,ignore
/// let tracker = MockTracker::new()
///     .with_list("l1", "TODO")
///     .with_current_user("me")
///     .with_item_assigned("c1", "Login", "l1", &["me"])
///     .failing_on(TrackerOp::PostComment);
///
/// assert_eq!(tracker.calls(TrackerOp::PostComment), 0);
/// ```
#[derive(Debug, Default)]
pub struct MockTracker {
    state: Mutex<BoardState>,
    call_count: AtomicU32,
}

impl MockTracker {
    /// Create an empty board whose current user is `me`.
    #[must_use]
    pub fn new() -> Self {
        let tracker = Self::default();
        tracker.state().current_user = "me".to_string();
        tracker
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a list (workflow state).
    #[must_use]
    pub fn with_list(self, list_id: &str, name: &str) -> Self {
        self.state()
            .lists
            .insert(list_id.to_string(), name.to_string());
        self
    }

    /// Set the id returned by `authenticated_user_id`.
    #[must_use]
    pub fn with_current_user(self, user_id: &str) -> Self {
        self.state().current_user = user_id.to_string();
        self
    }

    /// Add an unassigned item.
    #[must_use]
    pub fn with_item(self, item_id: &str, name: &str, list_id: &str) -> Self {
        self.with_item_assigned(item_id, name, list_id, &[])
    }

    /// Add an item assigned to `members`.
    #[must_use]
    pub fn with_item_assigned(
        self,
        item_id: &str,
        name: &str,
        list_id: &str,
        members: &[&str],
    ) -> Self {
        self.add_item(RawItem {
            id: item_id.to_string(),
            name: name.to_string(),
            url: format!("https://tracker.test/c/{item_id}"),
            state_id: list_id.to_string(),
            state_name: None,
            member_ids: members.iter().map(|m| m.to_string()).collect(),
            description: String::new(),
            labels: Vec::new(),
        });
        self
    }

    /// Attach a scenario set to an item the way a previous write would have.
    #[must_use]
    pub fn with_scenarios(self, item_id: &str, scenarios: ScenarioSet) -> Self {
        let file_name = ScenarioFileConvention.file_name(item_id);
        self.with_scenario_file(item_id, &file_name, transfer::encode(&scenarios).into_bytes())
    }

    /// Attach arbitrary bytes as an item's scenario file, with a marker
    /// comment.
    #[must_use]
    pub fn with_scenario_file(self, item_id: &str, file_name: &str, bytes: Vec<u8>) -> Self {
        {
            let mut state = self.state();
            let attachment_id = state.next_id("att");
            let comment_id = state.next_id("cmt");
            state
                .attachments
                .entry(item_id.to_string())
                .or_default()
                .push(StoredAttachment {
                    attachment: Attachment {
                        id: attachment_id.clone(),
                        name: file_name.to_string(),
                        url: format!("mock://attachments/{attachment_id}"),
                    },
                    bytes,
                });
            state
                .comments
                .entry(item_id.to_string())
                .or_default()
                .push(Comment {
                    id: comment_id,
                    text: MARKER_TEXT.to_string(),
                    has_attachment_hint: false,
                });
        }
        self
    }

    /// Make every call of `op` fail.
    #[must_use]
    pub fn failing_on(self, op: TrackerOp) -> Self {
        self.fail_on(op);
        self
    }

    /// Make every call of `op` fail from now on.
    pub fn fail_on(&self, op: TrackerOp) {
        self.state().failures.insert(op);
    }

    /// Make `op` fail only for `item_id`.
    pub fn fail_item_on(&self, item_id: &str, op: TrackerOp) {
        self.state()
            .item_failures
            .insert((item_id.to_string(), op));
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.item_failures.clear();
    }

    /// Add an item after construction.
    pub fn add_item(&self, item: RawItem) {
        self.state().items.push(item);
    }

    /// Number of calls of `op`.
    pub fn calls(&self, op: TrackerOp) -> u32 {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Total number of calls.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every call in order, as `op item_id`.
    pub fn journal(&self) -> Vec<String> {
        self.state().journal.clone()
    }

    /// Number of marker comments on an item.
    pub fn marker_count(&self, item_id: &str) -> usize {
        self.state()
            .comments
            .get(item_id)
            .map_or(0, |c| c.iter().filter(|c| c.text == MARKER_TEXT).count())
    }

    /// Number of scenario-looking attachments on an item.
    pub fn attachment_count(&self, item_id: &str) -> usize {
        self.state().attachments.get(item_id).map_or(0, |a| {
            a.iter()
                .filter(|a| ScenarioFileConvention.matches(&a.attachment.name))
                .count()
        })
    }

    fn begin(&self, op: TrackerOp, item_id: Option<&str>) -> TrackerResult<MutexGuard<'_, BoardState>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.enter(op, item_id)?;
        Ok(state)
    }
}

fn not_found(op: TrackerOp, what: &str) -> TrackerError {
    TrackerError::with_status(op.to_string(), 404, format!("{what} not found"))
}

#[async_trait]
impl TrackerClient for MockTracker {
    async fn list_items(&self, _scope_id: &str) -> TrackerResult<Vec<RawItem>> {
        let state = self.begin(TrackerOp::ListItems, None)?;
        Ok(state
            .items
            .iter()
            .cloned()
            .map(|mut item| {
                item.state_name = state.lists.get(&item.state_id).cloned();
                item
            })
            .collect())
    }

    async fn comments(&self, item_id: &str) -> TrackerResult<Vec<Comment>> {
        let state = self.begin(TrackerOp::Comments, Some(item_id))?;
        if !state.has_item(item_id) {
            return Err(not_found(TrackerOp::Comments, item_id));
        }
        Ok(state.comments.get(item_id).cloned().unwrap_or_default())
    }

    async fn attachments(&self, item_id: &str) -> TrackerResult<Vec<Attachment>> {
        let state = self.begin(TrackerOp::Attachments, Some(item_id))?;
        if !state.has_item(item_id) {
            return Err(not_found(TrackerOp::Attachments, item_id));
        }
        Ok(state
            .attachments
            .get(item_id)
            .map(|a| a.iter().map(|s| s.attachment.clone()).collect())
            .unwrap_or_default())
    }

    async fn upload_attachment(
        &self,
        item_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> TrackerResult<Attachment> {
        let mut state = self.begin(TrackerOp::UploadAttachment, Some(item_id))?;
        if !state.has_item(item_id) {
            return Err(not_found(TrackerOp::UploadAttachment, item_id));
        }
        let id = state.next_id("att");
        let attachment = Attachment {
            id: id.clone(),
            name: file_name.to_string(),
            url: format!("mock://attachments/{id}"),
        };
        state
            .attachments
            .entry(item_id.to_string())
            .or_default()
            .push(StoredAttachment {
                attachment: attachment.clone(),
                bytes,
            });
        Ok(attachment)
    }

    async fn post_comment(&self, item_id: &str, text: &str) -> TrackerResult<Comment> {
        let mut state = self.begin(TrackerOp::PostComment, Some(item_id))?;
        if !state.has_item(item_id) {
            return Err(not_found(TrackerOp::PostComment, item_id));
        }
        let comment = Comment {
            id: state.next_id("cmt"),
            text: text.to_string(),
            has_attachment_hint: false,
        };
        state
            .comments
            .entry(item_id.to_string())
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&self, comment_id: &str) -> TrackerResult<()> {
        let mut state = self.begin(TrackerOp::DeleteComment, None)?;
        for comments in state.comments.values_mut() {
            if let Some(pos) = comments.iter().position(|c| c.id == comment_id) {
                comments.remove(pos);
                return Ok(());
            }
        }
        Err(not_found(TrackerOp::DeleteComment, comment_id))
    }

    async fn delete_attachment(&self, item_id: &str, attachment_id: &str) -> TrackerResult<()> {
        let mut state = self.begin(TrackerOp::DeleteAttachment, Some(item_id))?;
        let attachments = state
            .attachments
            .get_mut(item_id)
            .ok_or_else(|| not_found(TrackerOp::DeleteAttachment, attachment_id))?;
        let pos = attachments
            .iter()
            .position(|a| a.attachment.id == attachment_id)
            .ok_or_else(|| not_found(TrackerOp::DeleteAttachment, attachment_id))?;
        attachments.remove(pos);
        Ok(())
    }

    async fn authenticated_user_id(&self) -> TrackerResult<String> {
        let state = self.begin(TrackerOp::AuthenticatedUser, None)?;
        Ok(state.current_user.clone())
    }

    async fn download_attachment(&self, attachment: &Attachment) -> TrackerResult<Vec<u8>> {
        let owner = self
            .state()
            .attachments
            .iter()
            .find(|(_, list)| list.iter().any(|a| a.attachment.id == attachment.id))
            .map(|(item_id, _)| item_id.clone());
        let state = self.begin(TrackerOp::DownloadAttachment, owner.as_deref())?;
        state
            .attachments
            .values()
            .flatten()
            .find(|a| a.attachment.id == attachment.id)
            .map(|a| a.bytes.clone())
            .ok_or_else(|| not_found(TrackerOp::DownloadAttachment, &attachment.id))
    }
}

// =============================================================================
// MockConflictAnalyzer
// =============================================================================

#[derive(Debug, Clone)]
enum PairScript {
    Risk(PairwiseRisk),
    Fail(String),
}

/// Scripted code-level analyzer.
///
/// Pairs are looked up in either direction. Unscripted pairs return the
/// default rate (zero unless set).
///
/// # Example
///
/// ```rust,ignore
/// let analyzer = MockConflictAnalyzer::new()
///     .with_pair("A", "B", 0.6, &["app/models/order.rb"])
///     .with_failure("A", "C", "clone failed");
/// ```
#[derive(Debug, Default)]
pub struct MockConflictAnalyzer {
    pairs: HashMap<(String, String), PairScript>,
    default_rate: f64,
    cancel_after: Option<(u32, CancellationToken)>,
    call_count: AtomicU32,
    focus: Mutex<HashMap<(String, String), Vec<String>>>,
}

impl MockConflictAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the risk for a pair.
    #[must_use]
    pub fn with_pair(mut self, a: &str, b: &str, rate: f64, files: &[&str]) -> Self {
        let risk = PairwiseRisk::new(rate, files.iter().map(|f| f.to_string()).collect());
        self.pairs
            .insert((a.to_string(), b.to_string()), PairScript::Risk(risk));
        self
    }

    /// Make a pair fail.
    #[must_use]
    pub fn with_failure(mut self, a: &str, b: &str, error: &str) -> Self {
        self.pairs.insert(
            (a.to_string(), b.to_string()),
            PairScript::Fail(error.to_string()),
        );
        self
    }

    /// Rate for unscripted pairs.
    #[must_use]
    pub fn with_default_rate(mut self, rate: f64) -> Self {
        self.default_rate = rate;
        self
    }

    /// Cancel `token` once `calls` analyses have run.
    #[must_use]
    pub fn cancelling_after(mut self, calls: u32, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    /// Get the number of analyses run.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Focus files passed for the last analysis of `target` vs `other`.
    pub fn focus_files_for(&self, target: &str, other: &str) -> Option<Vec<String>> {
        self.focus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(target.to_string(), other.to_string()))
            .cloned()
    }

    fn script_for(&self, a: &str, b: &str) -> Option<&PairScript> {
        self.pairs
            .get(&(a.to_string(), b.to_string()))
            .or_else(|| self.pairs.get(&(b.to_string(), a.to_string())))
    }
}

#[async_trait]
impl CodeConflictAnalyzer for MockConflictAnalyzer {
    async fn pairwise_risk(
        &self,
        target: &Task,
        other: &Task,
        focus_files: &[String],
    ) -> Result<PairwiseRisk> {
        let calls = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.focus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((target.id.clone(), other.id.clone()), focus_files.to_vec());

        if let Some((after, token)) = &self.cancel_after {
            if calls >= *after {
                token.cancel();
            }
        }

        match self.script_for(&target.id, &other.id) {
            Some(PairScript::Risk(risk)) => Ok(risk.clone()),
            Some(PairScript::Fail(error)) => bail!("{}", error),
            None => Ok(PairwiseRisk::new(self.default_rate, Vec::new())),
        }
    }

    fn name(&self) -> &str {
        "mock-analyzer"
    }
}

// =============================================================================
// CancellingProgress
// =============================================================================

/// Progress sink that cancels a token once `after` status lines have been
/// reported. A classification pass reports one status line per item, so
/// this stops a pass partway through a board.
#[derive(Debug)]
pub struct CancellingProgress {
    token: CancellationToken,
    after: u32,
    seen: AtomicU32,
}

impl CancellingProgress {
    #[must_use]
    pub fn new(after: u32, token: CancellationToken) -> Self {
        Self {
            token,
            after,
            seen: AtomicU32::new(0),
        }
    }

    /// Status lines reported so far.
    pub fn seen(&self) -> u32 {
        self.seen.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for CancellingProgress {
    fn set_fraction(&self, _fraction: f64) {}

    fn set_text(&self, _text: &str) {
        let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if seen >= self.after {
            self.token.cancel();
        }
    }

    fn set_detail(&self, _detail: &str) {}
}
