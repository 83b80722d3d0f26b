// src/config/build.rs

use tracing::debug;

use crate::config::model::{TaskSettings, WorkflowFile};
use crate::dag::DependencyGraph;
use crate::errors::Result;
use crate::exec::{shell_compensation, shell_task};
use crate::task::{Task, TaskBuilder};

impl WorkflowFile {
    /// Build a sealed graph of shell-command tasks.
    ///
    /// Fails on unknown `after` entries and dependency cycles.
    pub fn build_graph(&self) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for settings in &self.tasks {
            graph.add_task(shell_command_task(settings)?)?;
        }
        graph.seal()?;
        debug!(order = ?graph.execution_order(), "workflow graph built");
        Ok(graph)
    }
}

fn shell_command_task(settings: &TaskSettings) -> Result<Task> {
    let mut builder = TaskBuilder::create(settings.name.clone())?;
    builder
        .with_execution_fn(shell_task(&settings.name, &settings.cmd))
        .with_max_retry_count(settings.retries)
        .with_retry_delay(settings.retry_delay)
        .with_priority(settings.priority)
        .continue_on_failure(settings.continue_on_failure)
        .with_dependencies(settings.after.iter().cloned())?;

    if let Some(timeout) = settings.timeout {
        builder.with_timeout(timeout)?;
    }
    if let Some(estimate) = settings.estimated_duration {
        builder.with_estimated_duration(estimate);
    }
    if let Some(cmd) = &settings.compensate {
        builder.with_compensation_fn(shell_compensation(&settings.name, cmd));
    }
    if let Some(key) = settings.when.clone() {
        builder.with_condition(move |ctx| ctx.is_truthy(&key));
    }
    for (key, value) in &settings.metadata {
        builder.with_metadata(key, value);
    }

    builder.build()
}
