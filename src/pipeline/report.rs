// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

//! Run results
//!
//! Per-stage results and the report returned for a whole run. Both are plain
//! data that serialize with serde; how they are displayed or stored is up to
//! the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::workspace::ArtifactRecord;

/// Identity of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Fresh random run id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a stage within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl StageStatus {
    /// No further transitions happen from a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: StageStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Skipped | Self::Cancelled),
            Self::Running => matches!(next, Self::Succeeded | Self::Failed | Self::Cancelled),
            _ => false,
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How one attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

/// One attempt at running a stage
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,

    pub outcome: AttemptOutcome,

    pub exit_code: Option<i32>,

    /// Time the command ran
    pub duration: Duration,

    /// Delay waited before this attempt started
    pub backoff: Duration,

    /// Error message when the attempt did not succeed
    pub error: Option<String>,
}

/// Final state of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub name: String,

    pub status: StageStatus,

    /// Whether the run's success depends on this stage
    pub required: bool,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Exit code of the last attempt, if it exited
    pub exit_code: Option<i32>,

    /// Combined output of the last attempt
    pub output: String,

    /// Number of attempts made
    pub attempts: u32,

    pub attempt_log: Vec<AttemptRecord>,

    /// Why the stage did not succeed
    pub error: Option<String>,
}

impl StageResult {
    /// A stage that hasn't started
    pub fn pending(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            required,
            started_at: None,
            finished_at: None,
            exit_code: None,
            output: String::new(),
            attempts: 0,
            attempt_log: Vec::new(),
            error: None,
        }
    }

    /// Move to `next`, stamping start and end times
    ///
    /// Returns `false` and leaves the result untouched when the transition
    /// would go backwards or leave a terminal status.
    pub fn advance(&mut self, next: StageStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }

        let now = Utc::now();
        if next == StageStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        true
    }

    /// Time between start and finish, if the stage ran
    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.started_at?, self.finished_at?);
        (end - start).to_std().ok()
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Derive the run outcome from final stage results
    pub fn from_results(results: &[StageResult], cancelled: bool) -> Self {
        if cancelled {
            return Self::Cancelled;
        }

        let required_ok = results
            .iter()
            .filter(|r| r.required)
            .all(|r| r.status == StageStatus::Succeeded);

        if required_ok {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,

    pub pipeline: String,

    pub status: RunStatus,

    /// Stage results in completion order
    pub stages: Vec<StageResult>,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    pub duration: Duration,

    /// Files kept from the workspace
    pub artifacts: Vec<ArtifactRecord>,
}

impl RunReport {
    /// Result of a stage by name
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Status of a stage by name
    pub fn status_of(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|s| s.status)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Stages that ended with `status`
    pub fn stages_with(&self, status: StageStatus) -> impl Iterator<Item = &StageResult> {
        self.stages.iter().filter(move |s| s.status == status)
    }

    /// Render the report as pretty JSON
    pub fn to_json(&self) -> crate::errors::PipewrightResult<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}
