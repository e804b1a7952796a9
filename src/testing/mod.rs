//! Testing infrastructure for TAITI.
//!
//! This module provides mocks and assertions for testing the sync protocol,
//! classification and scoring without a real tracker or analyzer.
//!
//! # Architecture
//!
//! - **Mocks**: an in-memory [`MockTracker`] board with per-operation
//!   failure injection, and a scripted [`MockConflictAnalyzer`]
//! - **Assertions**: checks for bucket partitions and conflict reports
//!
//! # Example
//!
//! ```rust,ignore
//! use taiti::testing::{MockTracker, TrackerOp};
//!
//! let tracker = MockTracker::new()
//!     .with_list("l1", "TODO")
//!     .with_item_assigned("c1", "Login", "l1", &["me"])
//!     .failing_on(TrackerOp::PostComment);
//! ```

pub mod assertions;
pub mod mocks;

// Re-export commonly used types
pub use assertions::*;
pub use mocks::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ScenarioReference, ScenarioSet};
    use crate::sync::ScenarioSync;
    use std::sync::Arc;

    // =========================================================================
    // Mock Tracker Tests
    // =========================================================================

    #[tokio::test]
    async fn test_seeded_scenarios_are_readable() {
        let set: ScenarioSet = vec![
            ScenarioReference::new("features/cart.feature", 4),
            ScenarioReference::new("features/cart.feature", 19),
        ]
        .into_iter()
        .collect();
        let tracker = Arc::new(
            MockTracker::new()
                .with_item("c1", "Cart", "l1")
                .with_scenarios("c1", set.clone()),
        );

        let sync = ScenarioSync::new(tracker.clone());
        assert_eq!(sync.read("c1").await.unwrap(), Some(set));
        assert_eq!(tracker.marker_count("c1"), 1);
        assert_eq!(tracker.attachment_count("c1"), 1);
    }

    #[tokio::test]
    async fn test_write_protocol_order() {
        let tracker = Arc::new(MockTracker::new().with_item("c1", "Cart", "l1"));
        let sync = ScenarioSync::new(tracker.clone());
        sync.write(
            "c1",
            &std::iter::once(ScenarioReference::new("a.feature", 1)).collect(),
        )
        .await
        .unwrap();

        assert_eq!(
            tracker.journal(),
            vec![
                "comments c1",
                "attachments c1",
                "upload_attachment c1",
                "post_comment c1",
            ]
        );
    }
}
