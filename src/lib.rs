//! TAITI - Task/scenario sync and conflict-risk engine
//!
//! Developers tie work items on an issue tracker to the test scenarios
//! (feature file lines) the work will touch. TAITI stores those scenario
//! sets on the tracker items and scores how likely pending items are to
//! collide before anyone starts coding.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`scenario`] - Scenario references, scenario sets and the transfer file format
//! - [`tracker`] - Tracker capability and the Trello adapter
//! - [`sync`] - Reading, writing and deleting scenario sets on tracker items
//! - [`classify`] - Sorting board items into buckets
//! - [`conflict`] - Overlap and deep conflict-risk scoring
//! - [`board`] - Refresh passes and the published board snapshot
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Testing infrastructure (mocks, assertions)
//!
//! # Example
//!
//! ```rust,ignore
//! use taiti::{BoardEngine, TaitiConfig, TaskBucket};
//! use taiti::progress::TracingProgress;
//! use taiti::tracker::trello::{TrelloClient, TrelloCredentials};
//!
//! let config = TaitiConfig::load(".")?.with_env_overrides();
//! let (board, key, token) = config.require_tracker()?;
//! let client = TrelloClient::new(TrelloCredentials::new(key, token))?;
//!
//! let engine = BoardEngine::new(Arc::new(client), board, config.bucket_rules());
//! let snapshot = engine.refresh(&TracingProgress, &CancellationToken::new()).await?;
//! for task in snapshot.bucket(TaskBucket::MineUnstarted) {
//!     println!("{}: {}%", task.name, task.conflict_rate);
//! }
//! ```

pub mod board;
pub mod classify;
pub mod config;
pub mod conflict;
pub mod error;
pub mod progress;
pub mod scenario;
pub mod sync;
pub mod task;
pub mod testing;
pub mod tracker;

// Re-export commonly used types
pub use error::{IntoTaitiError, Result, TaitiError, WriteStage};

// Re-export config types
pub use config::TaitiConfig;

// Re-export engine types
pub use board::{BoardEngine, BoardSnapshot};
pub use classify::{BucketRules, Classification, TaskClassifier};
pub use conflict::{
    CodeConflictAnalyzer, ConflictDetail, ConflictReport, ConflictScorer, PairwiseRisk, RateSource,
};
pub use scenario::{ScenarioReference, ScenarioSet};
pub use sync::{ScenarioSync, MARKER_TEXT};
pub use task::{Task, TaskBucket, TaskRef};
pub use tracker::{TrackerClient, TrackerError};

// Re-export testing types for convenience
pub use testing::{MockConflictAnalyzer, MockTracker, TrackerOp};
