// src/exec/record.rs

//! The per-task execution record an execution controller publishes when a
//! task reaches a terminal state.

use std::time::SystemTime;

use crate::task::TaskError;
use crate::types::{TaskName, TaskState};

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub task: TaskName,
    /// `Succeeded`, `Failed` or `Cancelled`.
    pub state: TaskState,
    /// Attempts started, including the last one.
    pub attempts: u32,
    pub last_error: Option<TaskError>,
    pub started_at: Option<SystemTime>,
    pub finished_at: SystemTime,
}

impl ExecutionRecord {
    pub fn succeeded(task: impl Into<TaskName>, attempts: u32) -> Self {
        Self::terminal(task, TaskState::Succeeded, attempts, None)
    }

    pub fn failed(task: impl Into<TaskName>, attempts: u32, error: TaskError) -> Self {
        Self::terminal(task, TaskState::Failed, attempts, Some(error))
    }

    pub fn cancelled(task: impl Into<TaskName>, attempts: u32, reason: Option<TaskError>) -> Self {
        Self::terminal(task, TaskState::Cancelled, attempts, reason)
    }

    fn terminal(
        task: impl Into<TaskName>,
        state: TaskState,
        attempts: u32,
        last_error: Option<TaskError>,
    ) -> Self {
        Self {
            task: task.into(),
            state,
            attempts,
            last_error,
            started_at: None,
            finished_at: SystemTime::now(),
        }
    }

    pub fn with_started_at(mut self, at: SystemTime) -> Self {
        self.started_at = Some(at);
        self
    }
}
