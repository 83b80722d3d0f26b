// src/lib.rs

//! taskweave: a dependency-graph task execution engine.
//!
//! Tasks are built with [`TaskBuilder`], collected into a
//! [`DependencyGraph`] and run by an [`Engine`], which honours dependency
//! order, priorities, a concurrency limit, per-task retries and timeouts,
//! cooperative cancellation and compensation of succeeded work when a run
//! aborts.
//!
//! ```no_run
//! use taskweave::{DependencyGraph, Engine, ExecutionContext, RunOptions, TaskBuilder, TaskOutcome};
//!
//! # async fn demo() -> taskweave::errors::Result<()> {
//! let mut fetch = TaskBuilder::create("fetch")?;
//! fetch.with_execution(|_ctx, _cancel| async { TaskOutcome::Success });
//!
//! let mut build = TaskBuilder::create("build")?;
//! build
//!     .with_execution(|_ctx, _cancel| async { TaskOutcome::Success })
//!     .with_dependencies(["fetch"])?;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_task(fetch.build()?)?;
//! graph.add_task(build.build()?)?;
//!
//! let result = Engine::new(RunOptions::default())
//!     .run(graph, ExecutionContext::new())
//!     .await?;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod task;
pub mod types;

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::CliArgs;
use crate::config::{WorkflowFile, load_and_validate};

pub use crate::dag::DependencyGraph;
pub use crate::engine::{
    AbortCause, CompensationReport, Engine, RunOptions, RunResult, TaskEvent, TaskReport,
    TransitionHook,
};
pub use crate::errors::TaskweaveError;
pub use crate::task::{ExecutionContext, Task, TaskBuilder, TaskError, TaskOutcome};
pub use crate::types::{RunStatus, SkipReason, TaskName, TaskState};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workflow loading
/// - graph building
/// - the engine run
/// - Ctrl-C handling
///
/// Returns an error when the workflow is invalid or the run aborts.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut workflow = load_and_validate(&args.config)?;
    if let Some(limit) = args.concurrency {
        workflow.options.concurrency_limit = Some(limit);
    }

    let graph = workflow.build_graph()?;

    if args.dry_run {
        print_dry_run(&workflow, &graph);
        return Ok(());
    }

    let ctx = args
        .properties
        .iter()
        .fold(ExecutionContext::builder(), |b, (k, v)| b.property(k, v))
        .build();

    // Ctrl-C -> cancel the run (compensation still happens).
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            cancel.cancel();
        });
    }

    let result = Engine::new(workflow.options.clone())
        .run_with_cancellation(graph, ctx, cancel)
        .await?;

    print_summary(&result);

    match &result.abort_cause {
        Some(cause) => bail!("run aborted: {cause}"),
        None => Ok(()),
    }
}

/// Dry-run output: a dependency-respecting order plus per-task settings.
fn print_dry_run(workflow: &WorkflowFile, graph: &DependencyGraph) {
    for line in dry_run_lines(workflow, graph) {
        println!("{line}");
    }
    debug!("dry-run complete (no execution)");
}

// The listed order only guarantees that dependencies come first. At run time
// ready tasks are dispatched by priority, so siblings may start in another
// order.
fn dry_run_lines(workflow: &WorkflowFile, graph: &DependencyGraph) -> Vec<String> {
    let mut lines = vec![
        "taskweave dry-run".to_string(),
        format!("  engine.concurrency = {:?}", workflow.options.concurrency_limit),
        format!(
            "  engine.default_timeout = {:?}",
            workflow.options.default_task_timeout
        ),
        String::new(),
    ];

    let order = graph.execution_order().unwrap_or_default();
    lines.push(format!(
        "topological order ({}; ready tasks start by priority at run time):",
        order.len()
    ));
    for name in order {
        let Some(task) = workflow.task(name) else {
            continue;
        };
        lines.push(format!("  - {name}"));
        lines.push(format!("      cmd: {}", task.cmd));
        if !task.after.is_empty() {
            lines.push(format!("      after: {:?}", task.after));
        }
        if task.priority != 0 {
            lines.push(format!("      priority: {}", task.priority));
        }
        if task.retries > 0 {
            lines.push(format!(
                "      retries: {} (delay {:?})",
                task.retries, task.retry_delay
            ));
        }
        if let Some(timeout) = task.timeout {
            lines.push(format!("      timeout: {timeout:?}"));
        }
        if let Some(ref when) = task.when {
            lines.push(format!("      when: {when}"));
        }
        if let Some(ref compensate) = task.compensate {
            lines.push(format!("      compensate: {compensate}"));
        }
        if task.continue_on_failure {
            lines.push("      continue_on_failure: true".to_string());
        }
    }
    lines
}

fn print_summary(result: &RunResult) {
    println!("run {} in {:?}", result.status, result.elapsed);
    for task in &result.tasks {
        let mut line = format!("  {:<24} {}", task.name, task.state);
        if let Some(reason) = task.skip_reason {
            line.push_str(&format!(" ({reason})"));
        }
        if task.attempts > 1 {
            line.push_str(&format!(" after {} attempts", task.attempts));
        }
        if let Some(ref err) = task.error {
            line.push_str(&format!(": {err}"));
        }
        println!("{line}");
    }

    if let Some(ref report) = result.compensation {
        println!("compensation (triggered by {}):", report.trigger);
        if report.entries.is_empty() {
            println!("  nothing to roll back");
        }
        for entry in &report.entries {
            match &entry.outcome {
                TaskOutcome::Success => println!("  {:<24} rolled back", entry.task),
                TaskOutcome::Failed(err) => println!("  {:<24} rollback failed: {err}", entry.task),
                TaskOutcome::Cancelled => println!("  {:<24} rollback cancelled", entry.task),
            }
        }
    }
}
