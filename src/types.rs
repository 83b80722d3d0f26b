// src/types.rs

//! Small shared vocabulary types used across the crate.

use std::fmt;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Per-run state of a task as seen by the scheduler.
///
/// Every task moves `Pending -> Ready -> Running -> {terminal}` at most once
/// per run. Tasks that are never dispatched jump straight from `Pending` or
/// `Ready` to `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting on dependencies.
    Pending,
    /// Dependencies satisfied; waiting for a free concurrency slot.
    Ready,
    /// Handed to an execution controller (including backoff between attempts).
    Running,
    Succeeded,
    /// Retries exhausted.
    Failed,
    Cancelled,
    /// Never ran. See [`SkipReason`] for why.
    Skipped,
}

impl TaskState {
    /// Whether no further transition can happen for this run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled | TaskState::Skipped
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
            TaskState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Why a task ended in [`TaskState::Skipped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The task's condition evaluated to false. Counts as satisfied for
    /// dependents.
    ConditionFalse,
    /// A (transitive) dependency failed with `continue_on_failure` set, so this
    /// task can never become ready.
    UpstreamFailed,
    /// The run aborted or was cancelled before the task was dispatched.
    RunAborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::ConditionFalse => "condition false",
            SkipReason::UpstreamFailed => "upstream failed",
            SkipReason::RunAborted => "run aborted",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a single engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    NotStarted,
    Running,
    /// Every task is terminal and nothing triggered an abort.
    Completed,
    /// A task failed without `continue_on_failure`, or the run was cancelled.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::NotStarted => "not started",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}
