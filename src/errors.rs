// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only construction-time problems (builder validation, graph sealing,
//! configuration) are reported through [`TaskweaveError`]. Task failures,
//! cancellations and compensation failures are data in a
//! [`RunResult`](crate::engine::RunResult), not errors.

use thiserror::Error;

use crate::types::TaskName;

#[derive(Error, Debug)]
pub enum TaskweaveError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate task: a task named '{0}' already exists in the graph")]
    DuplicateTask(TaskName),

    #[error("Missing dependency: task '{task}' depends on unknown task '{dependency}'")]
    MissingDependency {
        task: TaskName,
        dependency: TaskName,
    },

    #[error("Cycle detected in task graph: {}", .path.join(" -> "))]
    DagCycle { path: Vec<TaskName> },

    #[error("Task graph is sealed: {0}")]
    GraphSealed(String),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskName),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskweaveError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        TaskweaveError::Validation(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskweaveError>;
