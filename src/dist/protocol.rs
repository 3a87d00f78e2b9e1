//! IPC protocol for worker result channels.
//!
//! Messages are JSON-serialized and newline-delimited.

use serde::{Deserialize, Serialize};

/// Lifecycle phase a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Call,
    Teardown,
}

/// Outcome of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

/// Outcome report for one work item phase.
///
/// The coordinator never looks inside beyond [`counts_as_completed`] and
/// [`is_failure`]; the report is forwarded to the hook unchanged.
///
/// [`counts_as_completed`]: TestReport::counts_as_completed
/// [`is_failure`]: TestReport::is_failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Work item id this report belongs to.
    pub item: String,
    /// Pool slot of the worker that produced it.
    pub worker_index: usize,
    pub phase: Phase,
    pub outcome: Outcome,
    /// Seconds spent in this phase.
    pub duration: f64,
    /// Captured output, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl TestReport {
    /// Whether this report finishes its item: setup failed, or the call
    /// phase was reached.
    pub fn counts_as_completed(&self) -> bool {
        match self.phase {
            Phase::Call => true,
            Phase::Setup => self.outcome == Outcome::Failed,
            Phase::Teardown => false,
        }
    }

    /// Whether this report is a failure.
    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

/// Message from a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Outcome of one work item.
    TestStatus { report: TestReport },

    /// Sent exactly once, immediately before the worker terminates.
    Exit {
        worker_index: usize,
        items_processed: usize,
        exit_status: i32,
        /// Seconds the worker was alive.
        duration: f64,
    },

    /// Non-fatal diagnostic to surface to the user.
    ErrorMessage { text: String },

    /// Fatal failure inside the worker.
    Exception { payload: String },
}

impl Message {
    /// Create a status message.
    pub fn test_status(report: TestReport) -> Self {
        Self::TestStatus { report }
    }

    /// Create an error message.
    pub fn error_message(text: impl Into<String>) -> Self {
        Self::ErrorMessage { text: text.into() }
    }

    /// Create an exception message.
    pub fn exception(payload: impl Into<String>) -> Self {
        Self::Exception {
            payload: payload.into(),
        }
    }

    /// Message kind as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TestStatus { .. } => "test_status",
            Self::Exit { .. } => "exit",
            Self::ErrorMessage { .. } => "error_message",
            Self::Exception { .. } => "exception",
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> String {
        // A derived Serialize over strings, numbers and enums cannot fail
        let mut json = serde_json::to_string(self).unwrap_or_default();
        json.push('\n');
        json
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
