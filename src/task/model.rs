// src/task/model.rs

//! The [`Task`] value: immutable configuration plus a mutable dependency set.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::task::context::ExecutionContext;
use crate::task::outcome::TaskOutcome;
use crate::types::TaskName;

/// Boxed future returned by task bodies and compensation actions.
pub type TaskFuture = Pin<Box<dyn Future<Output = TaskOutcome> + Send + 'static>>;

/// Task body. Receives the run context and a cancellation token that fires on
/// timeout or run cancellation.
pub type ExecuteFn = Arc<dyn Fn(ExecutionContext, CancellationToken) -> TaskFuture + Send + Sync>;

/// Activation predicate evaluated right before dispatch.
pub type ConditionFn = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// Best-effort rollback action run when the engine compensates.
pub type CompensationFn = Arc<dyn Fn(ExecutionContext) -> TaskFuture + Send + Sync>;

/// A named, configured unit of work.
///
/// Built through [`TaskBuilder`](crate::task::TaskBuilder); only the
/// dependency set can change afterwards, and only until the owning graph is
/// sealed.
#[derive(Clone)]
pub struct Task {
    pub(crate) name: TaskName,
    pub(crate) execute: ExecuteFn,
    pub(crate) dependencies: BTreeSet<TaskName>,
    pub(crate) max_retry_count: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) timeout: Option<Duration>,
    pub(crate) condition: Option<ConditionFn>,
    pub(crate) compensation: Option<CompensationFn>,
    pub(crate) priority: i32,
    pub(crate) estimated_duration: Option<Duration>,
    pub(crate) continue_on_failure: bool,
    pub(crate) metadata: HashMap<String, String>,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &BTreeSet<TaskName> {
        &self.dependencies
    }

    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn estimated_duration(&self) -> Option<Duration> {
        self.estimated_duration
    }

    pub fn continue_on_failure(&self) -> bool {
        self.continue_on_failure
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }

    /// Add a dependency. Returns `false` if it was already present.
    pub fn add_dependency(&mut self, name: impl Into<TaskName>) -> bool {
        self.dependencies.insert(name.into())
    }

    /// Remove a dependency. Returns `false` if it was not present.
    pub fn remove_dependency(&mut self, name: &str) -> bool {
        self.dependencies.remove(name)
    }

    pub fn set_dependencies<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.dependencies = names.into_iter().map(Into::into).collect();
    }

    /// Evaluate the condition; tasks without one always run.
    pub(crate) fn should_run(&self, ctx: &ExecutionContext) -> bool {
        match &self.condition {
            Some(cond) => cond(ctx),
            None => true,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("max_retry_count", &self.max_retry_count)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("priority", &self.priority)
            .field("estimated_duration", &self.estimated_duration)
            .field("continue_on_failure", &self.continue_on_failure)
            .field("has_condition", &self.condition.is_some())
            .field("has_compensation", &self.compensation.is_some())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
