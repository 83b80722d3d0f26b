// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running a dispatched task's
//! execute function and reporting back to the run loop via
//! `RuntimeEvent`s.
//!
//! - [`controller`] owns the per-task attempt loop: timeout, retry and
//!   cooperative cancellation.
//! - [`retry`] computes exponential backoff delays.
//! - [`record`] is the terminal record a controller reports.
//! - [`command`] builds execute functions that run shell commands, used by
//!   workflow files and the CLI.

pub mod command;
pub mod controller;
pub mod record;
pub mod retry;

pub use command::{shell_compensation, shell_task};
pub use controller::ExecutionController;
pub use record::ExecutionRecord;
pub use retry::RetryPolicy;
