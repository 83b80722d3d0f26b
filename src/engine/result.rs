// src/engine/result.rs

//! What a run reports back to its caller.

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::task::{TaskError, TaskOutcome};
use crate::types::{RunStatus, SkipReason, TaskName, TaskState};

/// Why a run stopped before completing normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    /// A task without `continue_on_failure` exhausted its retries.
    TaskFailed { task: TaskName, error: TaskError },
    /// A task without `continue_on_failure` ended cancelled on its own
    /// (timeout, or its body reported cancellation).
    TaskCancelled {
        task: TaskName,
        reason: Option<TaskError>,
    },
    /// The caller cancelled the run.
    Cancelled,
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortCause::TaskFailed { task, error } => write!(f, "task '{task}' failed: {error}"),
            AbortCause::TaskCancelled { task, reason: Some(r) } => {
                write!(f, "task '{task}' was cancelled: {r}")
            }
            AbortCause::TaskCancelled { task, reason: None } => {
                write!(f, "task '{task}' was cancelled")
            }
            AbortCause::Cancelled => f.write_str("run cancelled"),
        }
    }
}

/// Final disposition of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub name: TaskName,
    pub state: TaskState,
    pub skip_reason: Option<SkipReason>,
    pub attempts: u32,
    /// Last error for failed tasks; the cancellation reason for cancelled ones.
    pub error: Option<TaskError>,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
}

/// One compensation action that ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationEntry {
    pub task: TaskName,
    pub outcome: TaskOutcome,
}

/// Rollback that followed an aborted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationReport {
    /// Abort cause that triggered the rollback. Compensation errors never
    /// replace it.
    pub trigger: AbortCause,
    /// In execution order (reverse completion order).
    pub entries: Vec<CompensationEntry>,
}

impl CompensationReport {
    /// Tasks whose compensation succeeded.
    pub fn compensated(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.outcome.is_success())
            .map(|e| e.task.as_str())
            .collect()
    }

    /// Compensation failures and cancellations, by task.
    pub fn errors(&self) -> Vec<(&str, TaskError)> {
        self.entries
            .iter()
            .filter_map(|e| match &e.outcome {
                TaskOutcome::Success => None,
                TaskOutcome::Failed(err) => Some((e.task.as_str(), err.clone())),
                TaskOutcome::Cancelled => {
                    Some((e.task.as_str(), TaskError::new("compensation cancelled")))
                }
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_success())
    }
}

/// Result of [`Engine::run`](crate::engine::Engine::run).
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: RunStatus,
    /// Every task in the graph, in execution (topological) order.
    pub tasks: Vec<TaskReport>,
    pub abort_cause: Option<AbortCause>,
    /// Present when the run aborted, even if no task had an action to run.
    pub compensation: Option<CompensationReport>,
    pub elapsed: Duration,
}

impl RunResult {
    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn state_of(&self, name: &str) -> Option<TaskState> {
        self.task(name).map(|t| t.state)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Tasks in a given terminal state, in execution order.
    pub fn tasks_in(&self, state: TaskState) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.state == state)
            .map(|t| t.name.as_str())
            .collect()
    }
}
