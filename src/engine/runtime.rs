// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{DependencyGraph, Dispatch, Scheduler, SchedulerStep};
use crate::errors::Result;
use crate::exec::ExecutionController;
use crate::task::ExecutionContext;
use crate::types::RunStatus;

use super::compensation::CompensationCoordinator;
use super::hooks::{HookPublisher, TaskEvent, TransitionHook};
use super::options::RunOptions;
use super::result::{RunResult, TaskReport};
use super::RuntimeEvent;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Entry point for running dependency graphs.
///
/// An `Engine` is cheap to clone and can run any number of graphs; each run
/// gets its own scheduler, worker pool and hook queue.
#[derive(Clone, Default)]
pub struct Engine {
    options: RunOptions,
    hooks: Vec<Arc<dyn TransitionHook>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Engine {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            hooks: Vec::new(),
        }
    }

    /// Register a hook that receives every [`TaskEvent`] of every run.
    pub fn with_hook(mut self, hook: impl TransitionHook) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run `graph` to completion or abort.
    ///
    /// Fails only if the options are invalid or the graph cannot be sealed
    /// (missing dependency, cycle). Everything that happens while tasks run
    /// is reported in the [`RunResult`].
    pub async fn run(&self, graph: DependencyGraph, ctx: ExecutionContext) -> Result<RunResult> {
        self.run_with_cancellation(graph, ctx, CancellationToken::new())
            .await
    }

    /// Like [`Engine::run`], but `cancellation` stops the run: nothing new is
    /// dispatched, in-flight tasks are cancelled, and compensation runs.
    pub async fn run_with_cancellation(
        &self,
        graph: DependencyGraph,
        ctx: ExecutionContext,
        cancellation: CancellationToken,
    ) -> Result<RunResult> {
        self.options.validate()?;
        let scheduler = Scheduler::new(graph)?.with_default_timeout(self.options.default_task_timeout);
        let hooks = HookPublisher::spawn(self.hooks.clone(), self.options.hook_buffer);

        let runtime = Runtime::new(scheduler, self.options.clone(), ctx, cancellation, hooks);
        Ok(runtime.run().await)
    }
}

/// Run `graph` with at most `concurrency_limit` tasks in flight (unbounded
/// when `None`), an empty context and default options otherwise.
pub async fn run(
    graph: DependencyGraph,
    concurrency_limit: Option<usize>,
    cancellation: CancellationToken,
) -> Result<RunResult> {
    let options = RunOptions {
        concurrency_limit,
        ..RunOptions::default()
    };
    Engine::new(options)
        .run_with_cancellation(graph, ExecutionContext::new(), cancellation)
        .await
}

/// Drives the scheduler in response to `RuntimeEvent`s and hands dispatched
/// tasks to execution controllers.
///
/// This is a pure IO shell around [`Scheduler`], which contains all of the
/// scheduling semantics. This struct handles async IO: reading events from
/// the channel, admission through the semaphore, cancellation, compensation
/// and hook delivery.
struct Runtime {
    scheduler: Scheduler,
    options: RunOptions,
    ctx: ExecutionContext,
    permits: Arc<Semaphore>,
    external: CancellationToken,
    /// Child of `external`; also fired on abort when
    /// `cancel_in_flight_on_abort` is set.
    run_cancel: CancellationToken,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    hooks: HookPublisher,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    fn new(
        scheduler: Scheduler,
        options: RunOptions,
        ctx: ExecutionContext,
        external: CancellationToken,
        hooks: HookPublisher,
    ) -> Self {
        let permits = options
            .concurrency_limit
            .unwrap_or(Semaphore::MAX_PERMITS)
            .min(Semaphore::MAX_PERMITS);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let run_cancel = external.child_token();

        Self {
            scheduler,
            options,
            ctx,
            permits: Arc::new(Semaphore::new(permits)),
            external,
            run_cancel,
            event_tx,
            event_rx,
            hooks,
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches ready tasks while concurrency slots are free.
    /// - Feeds controller events into the scheduler.
    /// - Reacts to external cancellation exactly once.
    async fn run(mut self) -> RunResult {
        let started = Instant::now();
        info!(
            tasks = self.scheduler.graph().len(),
            concurrency = ?self.options.concurrency_limit,
            "taskweave run started"
        );

        let step = self.scheduler.start();
        self.apply(step);
        self.dispatch_ready();

        let mut cancel_seen = false;
        while !self.scheduler.is_finished() {
            tokio::select! {
                biased;
                _ = self.external.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    info!(in_flight = self.scheduler.in_flight(), "cancellation requested");
                    let step = self.scheduler.cancel();
                    self.apply(step);
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        // Unreachable while `self` holds a sender.
                        None => break,
                    }
                }
            }
            self.dispatch_ready();
        }

        let compensation = match self.scheduler.abort_cause().cloned() {
            Some(cause) if self.scheduler.status() == RunStatus::Aborted => {
                let coordinator = CompensationCoordinator::new(
                    self.scheduler.graph(),
                    &self.ctx,
                    self.options.compensation_timeout,
                    &self.hooks,
                );
                Some(
                    coordinator
                        .compensate(cause, self.scheduler.completion_order())
                        .await,
                )
            }
            _ => None,
        };

        let result = RunResult {
            status: self.scheduler.status(),
            tasks: self.reports(),
            abort_cause: self.scheduler.abort_cause().cloned(),
            compensation,
            elapsed: started.elapsed(),
        };

        info!(
            status = %result.status,
            elapsed = ?result.elapsed,
            "taskweave run finished"
        );

        self.hooks.flush(self.options.hook_flush_timeout).await;
        result
    }

    fn handle_event(&mut self, event: RuntimeEvent) {
        debug!(?event, "runtime received event");
        match event {
            RuntimeEvent::AttemptStarted { task, attempt } => {
                self.scheduler.note_attempt(&task, attempt);
                self.hooks.publish(TaskEvent::AttemptStarted { task, attempt });
            }
            RuntimeEvent::AttemptFailed {
                task,
                attempt,
                error,
                retry_in,
            } => {
                self.hooks.publish(TaskEvent::AttemptFailed {
                    task,
                    attempt,
                    error,
                    retry_in,
                });
            }
            RuntimeEvent::TaskFinished(record) => {
                let step = self.scheduler.handle_completion(record);
                self.apply(step);
            }
        }
    }

    fn apply(&mut self, step: SchedulerStep) {
        self.hooks.publish_all(step.transitions);

        if step.aborted && self.options.cancel_in_flight_on_abort && !self.run_cancel.is_cancelled()
        {
            warn!(
                in_flight = self.scheduler.in_flight(),
                "run aborted; cancelling in-flight tasks"
            );
            self.run_cancel.cancel();
        }
    }

    /// Admit ready tasks, highest priority first, while slots are free.
    ///
    /// A slot is claimed before a task's condition is evaluated and handed
    /// back if the task settles without running.
    fn dispatch_ready(&mut self) {
        loop {
            let step = self.scheduler.step_ready();
            let next = step.ready.first().cloned();
            self.apply(step);
            let Some(next) = next else {
                return;
            };

            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                debug!(waiting = %next, "no free concurrency slot");
                return;
            };

            let (decision, step) = self.scheduler.dispatch(&next, &self.ctx);
            self.apply(step);

            match decision {
                Dispatch::Run(scheduled) => {
                    let controller = ExecutionController::new(
                        scheduled,
                        self.ctx.clone(),
                        self.run_cancel.clone(),
                        Arc::clone(&self.permits),
                        self.event_tx.clone(),
                        self.options.max_retry_delay,
                        self.options.cancellation_grace,
                    );
                    controller.spawn(permit);
                }
                Dispatch::Settled => drop(permit),
                Dispatch::NotReady => {
                    drop(permit);
                    return;
                }
            }
        }
    }

    /// One report per task, in execution order.
    fn reports(&self) -> Vec<TaskReport> {
        let graph = self.scheduler.graph();
        let order: Vec<&str> = match graph.execution_order() {
            Some(order) => order.iter().map(String::as_str).collect(),
            None => graph.tasks().map(|t| t.name()).collect(),
        };

        order
            .into_iter()
            .filter_map(|name| self.scheduler.task_info(name))
            .map(|info| TaskReport {
                name: info.name.clone(),
                state: info.state,
                skip_reason: info.skip_reason,
                attempts: info.attempts,
                error: info.last_error.clone(),
                started_at: info.started_at,
                finished_at: info.finished_at,
            })
            .collect()
    }
}
