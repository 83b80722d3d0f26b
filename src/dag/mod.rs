// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the named tasks and their dependency edges.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready to run, and what happens when they finish.
//! - [`task_info`] provides per-run task state and the dispatch hand-off type.
//! - [`scheduler_step`] defines the result types for scheduler steps.
//! - [`state_manager`] applies per-run state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::DependencyGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::{Dispatch, SchedulerStep, Transition};
pub use task_info::{ScheduledTask, TaskInfo};
