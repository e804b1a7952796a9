//! Progress reporting for long passes.
//!
//! A classification pass reports how far it got and which item it is on.
//! The host decides how to show it: a spinner, a log line, or nothing.

use std::sync::Mutex;
use tracing::debug;

/// Receives progress from a running pass.
///
/// Implementations must be cheap; they are called once per item.
pub trait ProgressReporter: Send + Sync {
    /// Fraction done, `0.0..=1.0`.
    fn set_fraction(&self, fraction: f64);

    /// Main status line, e.g. `Processing card 3 of 12`.
    fn set_text(&self, text: &str);

    /// Secondary line, e.g. the current card's name.
    fn set_detail(&self, detail: &str);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn set_fraction(&self, _fraction: f64) {}
    fn set_text(&self, _text: &str) {}
    fn set_detail(&self, _detail: &str) {}
}

/// Emits progress as `debug!` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn set_fraction(&self, fraction: f64) {
        debug!(fraction, "progress");
    }

    fn set_text(&self, text: &str) {
        debug!("{}", text);
    }

    fn set_detail(&self, detail: &str) {
        debug!(detail, "progress detail");
    }
}

/// Records everything it is told. Useful in tests and for hosts that poll.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    state: Mutex<RecordedProgress>,
}

/// Snapshot of what a [`RecordingProgress`] has seen.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordedProgress {
    pub fraction: f64,
    pub texts: Vec<String>,
    pub details: Vec<String>,
}

impl RecordingProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded state.
    pub fn snapshot(&self) -> RecordedProgress {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for RecordingProgress {
    fn set_fraction(&self, fraction: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.fraction = fraction.clamp(0.0, 1.0);
        }
    }

    fn set_text(&self, text: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.texts.push(text.to_string());
        }
    }

    fn set_detail(&self, detail: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.details.push(detail.to_string());
        }
    }
}
