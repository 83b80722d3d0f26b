// src/engine/compensation.rs

//! Saga-style rollback after an aborted run.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{info, warn};

use crate::dag::DependencyGraph;
use crate::engine::hooks::{HookPublisher, TaskEvent};
use crate::engine::result::{AbortCause, CompensationEntry, CompensationReport};
use crate::task::{ExecutionContext, TaskError, TaskOutcome};
use crate::types::TaskName;

/// Runs compensation actions of succeeded tasks, most recently completed
/// first, one at a time.
///
/// Best effort: a failing, panicking or timed-out compensation is recorded
/// and the remaining ones still run.
pub(crate) struct CompensationCoordinator<'a> {
    graph: &'a DependencyGraph,
    ctx: &'a ExecutionContext,
    timeout: Option<Duration>,
    hooks: &'a HookPublisher,
}

impl<'a> CompensationCoordinator<'a> {
    pub(crate) fn new(
        graph: &'a DependencyGraph,
        ctx: &'a ExecutionContext,
        timeout: Option<Duration>,
        hooks: &'a HookPublisher,
    ) -> Self {
        Self {
            graph,
            ctx,
            timeout,
            hooks,
        }
    }

    pub(crate) async fn compensate(
        &self,
        trigger: AbortCause,
        completion_order: &[TaskName],
    ) -> CompensationReport {
        info!(
            cause = %trigger,
            succeeded = completion_order.len(),
            "run aborted; starting compensation"
        );

        let mut entries = Vec::new();
        for name in completion_order.iter().rev() {
            let Some(action) = self.graph.task(name).and_then(|t| t.compensation.clone()) else {
                continue;
            };

            let fut = AssertUnwindSafe(action(self.ctx.clone())).catch_unwind();
            let outcome = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(res) => settle(res),
                    Err(_) => TaskOutcome::Failed(TaskError::new(format!(
                        "compensation timed out after {limit:?}"
                    ))),
                },
                None => settle(fut.await),
            };

            match &outcome {
                TaskOutcome::Success => info!(task = %name, "compensation succeeded"),
                TaskOutcome::Failed(err) => {
                    warn!(task = %name, error = %err, "compensation failed; continuing")
                }
                TaskOutcome::Cancelled => warn!(task = %name, "compensation cancelled; continuing"),
            }

            self.hooks.publish(TaskEvent::CompensationFinished {
                task: name.clone(),
                outcome: outcome.clone(),
            });
            entries.push(CompensationEntry {
                task: name.clone(),
                outcome,
            });
        }

        CompensationReport { trigger, entries }
    }
}

fn settle(res: std::thread::Result<TaskOutcome>) -> TaskOutcome {
    res.unwrap_or_else(|panic| TaskOutcome::Failed(TaskError::from_panic(panic)))
}
