// src/task/mod.rs

//! Task definitions.
//!
//! - [`model`] holds the [`Task`] value and the closure types it stores.
//! - [`builder`] is the validating fluent constructor.
//! - [`outcome`] is the success / failure / cancelled tag task bodies return.
//! - [`context`] is the opaque per-run context passed to every closure.

pub mod builder;
pub mod context;
pub mod model;
pub mod outcome;

pub use builder::TaskBuilder;
pub use context::{ExecutionContext, ExecutionContextBuilder};
pub use model::{CompensationFn, ConditionFn, ExecuteFn, Task, TaskFuture};
pub use outcome::{TaskError, TaskOutcome};
