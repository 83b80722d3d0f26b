// src/dag/task_info.rs

//! Per-run task bookkeeping and the dispatch hand-off type.

use std::time::{Duration, SystemTime};

use crate::task::{Task, TaskError};
use crate::types::{SkipReason, TaskName, TaskState};

/// Mutable per-run state the scheduler keeps for every task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub state: TaskState,
    pub skip_reason: Option<SkipReason>,
    /// Attempts started so far.
    pub attempts: u32,
    pub last_error: Option<TaskError>,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
}

impl TaskInfo {
    pub fn new(name: TaskName) -> Self {
        Self {
            name,
            state: TaskState::Pending,
            skip_reason: None,
            attempts: 0,
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Whether the scheduler may still dispatch this task.
    pub fn is_waiting(&self) -> bool {
        matches!(self.state, TaskState::Pending | TaskState::Ready)
    }
}

/// A task the scheduler wants an execution controller to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task: Task,
    /// The task's own timeout, or the engine default when it has none.
    pub timeout: Option<Duration>,
}

impl ScheduledTask {
    pub fn new(task: Task, default_timeout: Option<Duration>) -> Self {
        let timeout = task.timeout.or(default_timeout);
        Self { task, timeout }
    }

    pub fn name(&self) -> &str {
        &self.task.name
    }
}
