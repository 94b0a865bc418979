//! Resumable step cursor and the time budget that bounds one invocation.
//!
//! A [`Progress`] is a continuation token: a driver receives it from a step,
//! may persist it anywhere, and hands it back unchanged to resume at the same
//! row. Only the adapter moves the offset or changes the state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Lifecycle state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    /// More rows remain; re-invoke with this progress.
    #[default]
    Running,
    /// The step stopped on a fatal error. The offset points at the failing row.
    Error,
    /// No more source rows.
    Done,
}

/// Cursor of one step across invocations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Rows already handled (imported or skipped).
    pub offset: u64,
    /// Total rows, recomputed each invocation as `remaining + offset`.
    pub count: u64,
    /// Current state.
    #[serde(default)]
    pub state: ProgressState,
    /// Message attached to the error state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Parameters carried to later invocations and steps.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Progress {
    /// Fresh progress at offset 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh progress carrying parameters from earlier steps.
    #[must_use]
    pub fn with_params(params: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Advances the cursor past the current row.
    pub fn advance(&mut self) {
        self.offset += 1;
    }

    /// Marks the step as finished.
    #[must_use]
    pub fn done(mut self) -> Self {
        self.state = ProgressState::Done;
        self.error_message = None;
        self
    }

    /// Marks the step as failed without moving the offset.
    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.state = ProgressState::Error;
        self.error_message = Some(message.into());
        self
    }

    /// Records a parameter for subsequent invocations and steps.
    pub fn add_param(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.params.insert(key.into(), value.into());
    }

    /// Returns true once the state is `Done` or `Error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ProgressState::Done | ProgressState::Error)
    }

    /// Fraction of rows handled, in `0.0..=1.0`.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.count == 0 {
            if self.state == ProgressState::Done {
                1.0
            } else {
                0.0
            }
        } else {
            (self.offset as f64 / self.count as f64).min(1.0)
        }
    }
}

/// Budget for a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Wall-clock time one invocation may run before yielding.
    pub max_execution: Duration,
    /// Optional cap on rows handled per invocation.
    pub max_rows: Option<u64>,
}

impl Budget {
    /// Time-only budget.
    #[must_use]
    pub const fn time(max_execution: Duration) -> Self {
        Self {
            max_execution,
            max_rows: None,
        }
    }

    /// Budget that never yields.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self::time(Duration::MAX)
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::time(Duration::from_secs(30))
    }
}

/// Decides when a running step must hand control back to its driver.
///
/// Started at the beginning of every invocation and consulted after every row.
#[derive(Debug)]
pub struct ContinuationScheduler {
    started: Instant,
    budget: Budget,
    rows: u64,
}

impl ContinuationScheduler {
    /// Starts the timer.
    #[must_use]
    pub fn start(budget: Budget) -> Self {
        Self {
            started: Instant::now(),
            budget,
            rows: 0,
        }
    }

    /// Records one handled row and reports whether the step must yield now.
    pub fn row_done(&mut self) -> bool {
        self.rows += 1;
        self.new_request_needed()
    }

    /// Returns true once the time or row budget is used up.
    #[must_use]
    pub fn new_request_needed(&self) -> bool {
        if let Some(max_rows) = self.budget.max_rows {
            if self.rows >= max_rows {
                return true;
            }
        }
        self.started.elapsed() >= self.budget.max_execution
    }

    /// Rows handled in this invocation.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Time spent in this invocation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
