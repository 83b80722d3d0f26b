// src/engine/mod.rs

//! Orchestration engine for taskweave.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the per-task execution controllers
//! - the main runtime event loop that reacts to:
//!   - attempt and completion reports from controllers
//!   - external cancellation
//! - compensation after an aborted run
//! - transition hooks
//!
//! The pure decision core lives in [`crate::dag::scheduler`]; the async/IO
//! shell is implemented in [`runtime`].

use std::time::Duration;

use crate::exec::ExecutionRecord;
use crate::task::TaskError;
use crate::types::TaskName;

/// Events flowing into the run loop from execution controllers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A controller started an attempt (1-based).
    AttemptStarted { task: TaskName, attempt: u32 },
    /// An attempt failed; `retry_in` is `None` when retries are exhausted.
    AttemptFailed {
        task: TaskName,
        attempt: u32,
        error: TaskError,
        retry_in: Option<Duration>,
    },
    /// A task reached a terminal state.
    TaskFinished(ExecutionRecord),
}

pub mod compensation;
pub mod hooks;
pub mod options;
pub mod result;
pub mod runtime;

pub use hooks::{TaskEvent, TransitionHook};
pub use options::RunOptions;
pub use result::{AbortCause, CompensationEntry, CompensationReport, RunResult, TaskReport};
pub use runtime::{Engine, run};
