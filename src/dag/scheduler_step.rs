// src/dag/scheduler_step.rs

//! Step-by-step result types for the scheduler.

use std::time::SystemTime;

use crate::dag::task_info::ScheduledTask;
use crate::types::{TaskName, TaskState};

/// One task state change, as published to transition hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub task: TaskName,
    pub from: TaskState,
    pub to: TaskState,
    pub at: SystemTime,
}

/// Structured result of a single scheduler "step".
///
/// The async run loop forwards `transitions` to hooks; tests use the rest to
/// step the scheduler by hand and assert on what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Every state change made during this step, in order.
    pub transitions: Vec<Transition>,
    /// Tasks currently `Ready`, highest priority first.
    pub ready: Vec<TaskName>,
    /// Whether this step moved the run to `Aborted`.
    pub aborted: bool,
    /// Whether this step made every task terminal.
    pub run_just_finished: bool,
}

/// What the run loop should do with a task it asked to dispatch.
#[derive(Debug)]
pub enum Dispatch {
    /// Hand the task to an execution controller.
    Run(ScheduledTask),
    /// The task settled without running (condition false, or the condition
    /// itself failed); no concurrency slot is needed.
    Settled,
    /// The task is not `Ready` (unknown, already dispatched, or run stopped).
    NotReady,
}
