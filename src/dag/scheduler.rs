// src/dag/scheduler.rs

use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::dag::graph::DependencyGraph;
use crate::dag::scheduler_step::{Dispatch, SchedulerStep, Transition};
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{ScheduledTask, TaskInfo};
use crate::engine::AbortCause;
use crate::errors::Result;
use crate::exec::ExecutionRecord;
use crate::task::{ExecutionContext, TaskError};
use crate::types::{RunStatus, SkipReason, TaskName, TaskState};

/// Scheduler holds the sealed graph plus all mutable state of one run.
///
/// It is synchronous and deterministic: the async run loop feeds it events
/// (start, dispatch requests, completions, cancellation) and acts on the
/// [`SchedulerStep`]s it returns. It is responsible for:
/// - deciding which tasks are ready, in priority order
/// - evaluating conditions right before dispatch
/// - recording terminal outcomes and the success completion order
/// - skipping dependents of continue-on-failure tasks
/// - aborting the run on any other failure
#[derive(Debug)]
pub struct Scheduler {
    graph: DependencyGraph,
    tasks: HashMap<TaskName, TaskInfo>,
    status: RunStatus,
    /// Tasks that satisfy dependents: succeeded or skipped by condition.
    completed: HashSet<TaskName>,
    /// Succeeded tasks in the order they finished.
    completion_order: Vec<TaskName>,
    abort_cause: Option<AbortCause>,
    default_timeout: Option<Duration>,
    finished: bool,
}

impl Scheduler {
    /// Take ownership of `graph` for one run, sealing it if needed.
    pub fn new(mut graph: DependencyGraph) -> Result<Self> {
        graph.seal()?;

        let tasks = graph
            .tasks()
            .map(|t| (t.name().to_string(), TaskInfo::new(t.name().to_string())))
            .collect();

        Ok(Self {
            graph,
            tasks,
            status: RunStatus::NotStarted,
            completed: HashSet::new(),
            completion_order: Vec::new(),
            abort_cause: None,
            default_timeout: None,
            finished: false,
        })
    }

    /// Timeout applied to tasks that do not set their own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// `true` once the run started and every task is terminal.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn run_state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|info| info.state)
    }

    pub fn task_info(&self, task: &str) -> Option<&TaskInfo> {
        self.tasks.get(task)
    }

    pub fn completion_order(&self) -> &[TaskName] {
        &self.completion_order
    }

    pub fn abort_cause(&self) -> Option<&AbortCause> {
        self.abort_cause.as_ref()
    }

    /// Number of tasks handed to controllers and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tasks
            .values()
            .filter(|info| info.state == TaskState::Running)
            .count()
    }

    /// Whether every dependency of `task` has succeeded or been skipped by
    /// its condition. `None` for unknown tasks.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let t = self.graph.task(task)?;
        Some(t.dependencies().iter().all(|d| self.completed.contains(d)))
    }

    /// `NotStarted -> Running`, returning the initially ready tasks.
    pub fn start(&mut self) -> SchedulerStep {
        if self.status != RunStatus::NotStarted {
            warn!(status = %self.status, "start called on a scheduler that already ran");
            return SchedulerStep::default();
        }

        self.status = RunStatus::Running;
        info!(tasks = self.graph.len(), "scheduler: run started");

        let mut step = self.step_ready();
        step.run_just_finished = self.maybe_finish_run(&mut step.transitions);
        step
    }

    /// Promote newly ready tasks and list everything currently `Ready`.
    pub fn step_ready(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.status != RunStatus::Running {
            return step;
        }

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, &mut step.transitions);
        step.ready = manager.collect_ready(&self.completed);
        step
    }

    /// Decide what happens to a `Ready` task now that a concurrency slot is
    /// available for it: evaluate its condition and either hand it out for
    /// execution or settle it on the spot.
    pub fn dispatch(&mut self, task: &str, ctx: &ExecutionContext) -> (Dispatch, SchedulerStep) {
        let mut step = SchedulerStep::default();

        if self.status != RunStatus::Running
            || self.run_state_of(task) != Some(TaskState::Ready)
        {
            return (Dispatch::NotReady, step);
        }
        let Some(t) = self.graph.task(task).cloned() else {
            return (Dispatch::NotReady, step);
        };

        match catch_unwind(AssertUnwindSafe(|| t.should_run(ctx))) {
            Ok(true) => {
                let mut manager =
                    StateManager::new(&self.graph, &mut self.tasks, &mut step.transitions);
                manager.transition(task, TaskState::Running);
                if let Some(info) = self.tasks.get_mut(task) {
                    info.started_at = Some(SystemTime::now());
                }
                info!(task = %task, priority = t.priority(), "dispatching task");
                (Dispatch::Run(ScheduledTask::new(t, self.default_timeout)), step)
            }
            Ok(false) => {
                let mut manager =
                    StateManager::new(&self.graph, &mut self.tasks, &mut step.transitions);
                manager.skip(task, SkipReason::ConditionFalse);
                self.completed.insert(task.to_string());
                info!(task = %task, "condition false; task skipped");
                step.run_just_finished = self.maybe_finish_run(&mut step.transitions);
                (Dispatch::Settled, step)
            }
            Err(panic) => {
                let error = TaskError::from_panic(panic);
                warn!(task = %task, error = %error, "condition panicked; failing task");
                {
                    let mut manager =
                        StateManager::new(&self.graph, &mut self.tasks, &mut step.transitions);
                    manager.transition(task, TaskState::Running);
                }
                let mut completion = self.handle_completion(ExecutionRecord::failed(task, 0, error));
                step.transitions.append(&mut completion.transitions);
                step.aborted = completion.aborted;
                step.run_just_finished = completion.run_just_finished;
                (Dispatch::Settled, step)
            }
        }
    }

    /// Record that a controller started attempt number `attempt` (1-based).
    pub fn note_attempt(&mut self, task: &str, attempt: u32) {
        match self.tasks.get_mut(task) {
            Some(info) => {
                info.attempts = info.attempts.max(attempt);
                if info.started_at.is_none() {
                    info.started_at = Some(SystemTime::now());
                }
                debug!(task = %task, attempt, "attempt started");
            }
            None => warn!(task = %task, "attempt reported for unknown task; ignoring"),
        }
    }

    /// Record a task's terminal outcome.
    ///
    /// - `Succeeded`: the task satisfies dependents and joins the completion
    ///   order.
    /// - `Failed` / `Cancelled` with `continue_on_failure`: dependents are
    ///   skipped, unrelated branches continue.
    /// - `Failed` / `Cancelled` otherwise: the run aborts and every task that
    ///   was not dispatched yet is skipped. In-flight tasks keep running.
    pub fn handle_completion(&mut self, record: ExecutionRecord) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let name = record.task.clone();

        match self.tasks.get_mut(&name) {
            Some(info) if info.state == TaskState::Running => {
                info.attempts = info.attempts.max(record.attempts);
                info.last_error = record.last_error.clone();
                if info.started_at.is_none() {
                    info.started_at = record.started_at;
                }
            }
            Some(info) => {
                warn!(
                    task = %name,
                    state = %info.state,
                    "completion for task that is not running; ignoring"
                );
                return step;
            }
            None => {
                warn!(task = %name, "completion for unknown task; ignoring");
                return step;
            }
        }

        let continue_on_failure = self
            .graph
            .task(&name)
            .is_some_and(|t| t.continue_on_failure());

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, &mut step.transitions);

        match record.state {
            TaskState::Succeeded => {
                manager.transition(&name, TaskState::Succeeded);
                info!(task = %name, attempts = record.attempts, "task succeeded");
                self.completed.insert(name.clone());
                self.completion_order.push(name.clone());
            }
            TaskState::Failed | TaskState::Cancelled => {
                manager.transition(&name, record.state);
                let error = record.last_error.clone();

                if self.status == RunStatus::Aborted {
                    info!(
                        task = %name,
                        state = %record.state,
                        "in-flight task finished after abort"
                    );
                } else if continue_on_failure {
                    let skipped = manager.skip_dependents(&name);
                    warn!(
                        task = %name,
                        state = %record.state,
                        error = ?error.as_ref().map(TaskError::message),
                        ?skipped,
                        "task did not succeed; continue_on_failure set, skipping its dependents"
                    );
                } else {
                    let skipped = manager.skip_all_waiting(SkipReason::RunAborted);
                    warn!(
                        task = %name,
                        state = %record.state,
                        error = ?error.as_ref().map(TaskError::message),
                        skipped = skipped.len(),
                        "task did not succeed; aborting run"
                    );
                    self.status = RunStatus::Aborted;
                    self.abort_cause = Some(match record.state {
                        TaskState::Failed => AbortCause::TaskFailed {
                            task: name.clone(),
                            error: error.unwrap_or_else(|| TaskError::new("task failed")),
                        },
                        _ => AbortCause::TaskCancelled {
                            task: name.clone(),
                            reason: error,
                        },
                    });
                    step.aborted = true;
                }
            }
            other => {
                warn!(task = %name, state = %other, "non-terminal state in execution record; ignoring");
            }
        }

        step.run_just_finished = self.maybe_finish_run(&mut step.transitions);
        step
    }

    /// External cancellation: stop dispatching and skip everything that has
    /// not started. In-flight tasks are cancelled by the run loop.
    pub fn cancel(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.status {
            RunStatus::NotStarted | RunStatus::Running => {
                let mut manager =
                    StateManager::new(&self.graph, &mut self.tasks, &mut step.transitions);
                let skipped = manager.skip_all_waiting(SkipReason::RunAborted);
                warn!(skipped = skipped.len(), "run cancelled");
                self.status = RunStatus::Aborted;
                self.abort_cause = Some(AbortCause::Cancelled);
                step.aborted = true;
            }
            RunStatus::Aborted | RunStatus::Completed => {
                debug!(status = %self.status, "cancel requested after run stopped; nothing to do");
            }
        }

        step.run_just_finished = self.maybe_finish_run(&mut step.transitions);
        step
    }

    /// Mark the run finished once every task is terminal.
    ///
    /// Returns `true` if this call finished the run.
    fn maybe_finish_run(&mut self, transitions: &mut Vec<Transition>) -> bool {
        if self.finished || self.status == RunStatus::NotStarted {
            return false;
        }

        let manager = StateManager::new(&self.graph, &mut self.tasks, transitions);
        if !manager.all_tasks_terminal() {
            return false;
        }

        if self.status == RunStatus::Running {
            self.status = RunStatus::Completed;
        }
        self.finished = true;
        info!(status = %self.status, "scheduler: all tasks terminal; run finished");
        true
    }
}
