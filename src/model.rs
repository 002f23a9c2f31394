//! Core data model: candidates, tasks, results, run statistics.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One discovered listing item eligible for processing.
///
/// Derived by extraction from a single scan pass; immutable afterwards.
/// Fields that could not be located stay empty rather than failing the
/// candidate (degraded extraction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable identity: detail link with query string stripped, or
    /// title + source when no link was extracted.
    pub id: String,
    pub title: String,
    pub source_name: String,
    pub location_text: String,
    /// Whether the item is tagged as posted by an intermediary.
    pub intermediary: bool,
    pub detail_link: String,
}

/// Lifecycle of the task occupying the channel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Written by the dispatcher, awaiting a worker.
    Pending,
    /// The matching worker has reported a result.
    Terminal,
}

/// The instruction handed from the driver to a worker context.
///
/// Created once by the dispatcher, mutated only by the matching worker,
/// cleared by the result waiter after consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Monotonic fencing token issued by the channel. A worker echoes it in
    /// the result; the waiter accepts only a matching seq.
    pub seq: u64,
    pub candidate_id: String,
    pub link: String,
    /// Description terms still to be applied inside the worker.
    pub description_terms: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub auto_close_worker: bool,
    pub status: TaskStatus,
}

impl Task {
    /// Task age relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the task is still within the freshness window.
    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < window
    }

    /// Whether `address` refers to the same page as the task link,
    /// ignoring any query string.
    pub fn link_matches(&self, address: &str) -> bool {
        strip_query(&self.link) == strip_query(address)
    }
}

/// Drop the query string from a link.
pub fn strip_query(link: &str) -> &str {
    link.split('?').next().unwrap_or(link)
}

/// Terminal outcome of one dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Contact control activated (or an already-done marker was found).
    SuccessChat,
    /// Contact + apply + confirmation sequence completed.
    SuccessApply,
    /// Description terms did not match; no action taken.
    Skip,
    /// No usable control found, or the worker hit an unexpected fault.
    Fail,
    /// Synthesized by the result waiter when no result arrived in time.
    Timeout,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::SuccessChat | Self::SuccessApply)
    }

    /// Non-fail outcomes earn a processed record; fail and timeout leave
    /// the item eligible for a later run.
    pub fn is_recordable(&self) -> bool {
        matches!(self, Self::SuccessChat | Self::SuccessApply | Self::Skip)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SuccessChat => "success_chat",
            Self::SuccessApply => "success_apply",
            Self::Skip => "skip",
            Self::Fail => "fail",
            Self::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// A worker's terminal report for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub seq: u64,
    pub outcome: Outcome,
    pub matched_description_terms: Vec<String>,
}

/// Outcome classification kept in the processed ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Apply,
    Chat,
    Skip,
}

impl OutcomeKind {
    /// Ledger classification for a recordable outcome.
    pub fn from_outcome(outcome: Outcome) -> Option<Self> {
        match outcome {
            Outcome::SuccessApply => Some(Self::Apply),
            Outcome::SuccessChat => Some(Self::Chat),
            Outcome::Skip => Some(Self::Skip),
            Outcome::Fail | Outcome::Timeout => None,
        }
    }
}

/// Process-wide run counters, persisted across passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub success_count: u32,
    pub fail_count: u32,
    pub skip_count: u32,
    /// Successful actions today; reset when `day` rolls over.
    pub daily_count: u32,
    pub day: NaiveDate,
}

impl RunStats {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            success_count: 0,
            fail_count: 0,
            skip_count: 0,
            daily_count: 0,
            day: today,
        }
    }

    /// Reset the daily counter if the date has changed.
    pub fn roll_day(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.daily_count = 0;
        }
    }

    /// Fold one terminal outcome into the counters.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::SuccessChat | Outcome::SuccessApply => {
                self.success_count += 1;
                self.daily_count += 1;
            }
            Outcome::Skip => self.skip_count += 1,
            Outcome::Fail | Outcome::Timeout => self.fail_count += 1,
        }
    }
}

/// Severity of a relayed trace line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
    Skip,
}

/// One line of the worker's shared trace log, relayed to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceLine {
    /// Milliseconds since the Unix epoch; the waiter relays lines newer
    /// than the last one it has seen.
    pub at_ms: i64,
    pub level: TraceLevel,
    pub message: String,
}

impl TraceLine {
    pub fn new(level: TraceLevel, message: impl Into<String>) -> Self {
        Self {
            at_ms: Utc::now().timestamp_millis(),
            level,
            message: message.into(),
        }
    }
}
