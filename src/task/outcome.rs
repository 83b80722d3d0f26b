// src/task/outcome.rs

//! Tagged outcome returned by task bodies and compensation actions.

use std::any::Any;
use std::fmt;

/// Human-readable error carried by a failed task or compensation.
///
/// Cheap to clone so it can be copied into reports and hook events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Build an error from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(format!("task panicked: {detail}"))
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TaskError {}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        // Alternate formatting keeps the whole context chain.
        Self::new(format!("{err:#}"))
    }
}

impl From<&str> for TaskError {
    fn from(msg: &str) -> Self {
        Self::new(msg)
    }
}

impl From<String> for TaskError {
    fn from(msg: String) -> Self {
        Self::new(msg)
    }
}

/// Outcome of one task attempt (or one compensation action).
///
/// The engine never looks at produced values, only at the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(TaskError),
    Cancelled,
}

impl TaskOutcome {
    pub fn failed(err: impl Into<TaskError>) -> Self {
        TaskOutcome::Failed(err.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

impl<T, E> From<Result<T, E>> for TaskOutcome
where
    E: Into<anyhow::Error>,
{
    fn from(res: Result<T, E>) -> Self {
        match res {
            Ok(_) => TaskOutcome::Success,
            Err(e) => TaskOutcome::Failed(TaskError::from(e.into())),
        }
    }
}
