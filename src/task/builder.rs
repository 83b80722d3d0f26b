// src/task/builder.rs

//! Fluent, validating constructor for [`Task`].
//!
//! Setters mutate the builder in place and return it again, so calls chain:
//!
//! ```no_run
//! # use std::time::Duration;
//! # use taskweave::task::{TaskBuilder, TaskOutcome};
//! # fn main() -> taskweave::errors::Result<()> {
//! let task = TaskBuilder::create("migrate")?
//!     .with_execution(|_ctx, _cancel| async { TaskOutcome::Success })
//!     .with_max_retry_count(2)
//!     .with_retry_delay(Duration::from_millis(200))
//!     .with_timeout(Duration::from_secs(30))?
//!     .with_priority(10)
//!     .build()?;
//! # let _ = task;
//! # Ok(())
//! # }
//! ```
//!
//! Unsigned counts and `Duration` make negative retry counts and delays
//! unrepresentable; the remaining constraints are checked eagerly by the
//! setter that receives the value.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::{Result, TaskweaveError};
use crate::task::context::ExecutionContext;
use crate::task::model::{CompensationFn, ConditionFn, ExecuteFn, Task, TaskFuture};
use crate::task::outcome::TaskOutcome;
use crate::types::TaskName;

#[derive(Clone)]
pub struct TaskBuilder {
    name: TaskName,
    execute: Option<ExecuteFn>,
    dependencies: BTreeSet<TaskName>,
    max_retry_count: u32,
    retry_delay: Duration,
    timeout: Option<Duration>,
    condition: Option<ConditionFn>,
    compensation: Option<CompensationFn>,
    priority: i32,
    estimated_duration: Option<Duration>,
    continue_on_failure: bool,
    metadata: HashMap<String, String>,
}

impl TaskBuilder {
    /// Start building a task. Fails if `name` is empty or only whitespace.
    pub fn create(name: impl Into<TaskName>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TaskweaveError::validation("task name must not be empty"));
        }

        Ok(Self {
            name,
            execute: None,
            dependencies: BTreeSet::new(),
            max_retry_count: 0,
            retry_delay: Duration::ZERO,
            timeout: None,
            condition: None,
            compensation: None,
            priority: 0,
            estimated_duration: None,
            continue_on_failure: false,
            metadata: HashMap::new(),
        })
    }

    pub fn with_execution<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(ExecutionContext, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let execute: ExecuteFn = Arc::new(move |ctx: ExecutionContext, cancel: CancellationToken| -> TaskFuture {
            Box::pin(f(ctx, cancel))
        });
        self.execute = Some(execute);
        self
    }

    /// Install an already type-erased body.
    pub fn with_execution_fn(&mut self, execute: ExecuteFn) -> &mut Self {
        self.execute = Some(execute);
        self
    }

    /// Number of retries after the first attempt; `0` disables retrying.
    pub fn with_max_retry_count(&mut self, count: u32) -> &mut Self {
        self.max_retry_count = count;
        self
    }

    /// Base delay for exponential backoff between attempts.
    pub fn with_retry_delay(&mut self, delay: Duration) -> &mut Self {
        self.retry_delay = delay;
        self
    }

    /// Bound on a single attempt's wall time. Must be non-zero.
    pub fn with_timeout(&mut self, timeout: Duration) -> Result<&mut Self> {
        if timeout.is_zero() {
            return Err(TaskweaveError::validation(format!(
                "task '{}': timeout must be greater than zero",
                self.name
            )));
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Replace the dependency set. Names must be non-empty.
    pub fn with_dependencies<I, S>(&mut self, names: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        let mut deps = BTreeSet::new();
        for dep in names {
            let dep = dep.into();
            if dep.trim().is_empty() {
                return Err(TaskweaveError::validation(format!(
                    "task '{}': dependency names must not be empty",
                    self.name
                )));
            }
            deps.insert(dep);
        }
        self.dependencies = deps;
        Ok(self)
    }

    pub fn with_condition<F>(&mut self, condition: F) -> &mut Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn with_compensation_action<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let compensation: CompensationFn = Arc::new(move |ctx: ExecutionContext| -> TaskFuture { Box::pin(f(ctx)) });
        self.compensation = Some(compensation);
        self
    }

    pub fn with_compensation_fn(&mut self, compensation: CompensationFn) -> &mut Self {
        self.compensation = Some(compensation);
        self
    }

    pub fn with_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Higher priority is dispatched first among simultaneously ready tasks.
    pub fn with_priority(&mut self, priority: i32) -> &mut Self {
        self.priority = priority;
        self
    }

    /// Advisory only; never used for correctness.
    pub fn with_estimated_duration(&mut self, estimate: Duration) -> &mut Self {
        self.estimated_duration = Some(estimate);
        self
    }

    pub fn continue_on_failure(&mut self, enabled: bool) -> &mut Self {
        self.continue_on_failure = enabled;
        self
    }

    /// Produce the task. Fails if no execution function was supplied.
    pub fn build(&self) -> Result<Task> {
        let execute = self.execute.clone().ok_or_else(|| {
            TaskweaveError::validation(format!(
                "task '{}': an execution function is required",
                self.name
            ))
        })?;

        Ok(Task {
            name: self.name.clone(),
            execute,
            dependencies: self.dependencies.clone(),
            max_retry_count: self.max_retry_count,
            retry_delay: self.retry_delay,
            timeout: self.timeout,
            condition: self.condition.clone(),
            compensation: self.compensation.clone(),
            priority: self.priority,
            estimated_duration: self.estimated_duration,
            continue_on_failure: self.continue_on_failure,
            metadata: self.metadata.clone(),
        })
    }
}
