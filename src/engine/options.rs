// src/engine/options.rs

use std::time::Duration;

use crate::errors::{Result, TaskweaveError};

/// Engine-level settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum number of task attempts running at once. `None` is unbounded.
    pub concurrency_limit: Option<usize>,
    /// Applied to tasks that do not set their own timeout.
    pub default_task_timeout: Option<Duration>,
    /// Cap on any single backoff delay.
    pub max_retry_delay: Duration,
    /// How long a cancelled or timed-out attempt may take to wind down
    /// before it is dropped.
    pub cancellation_grace: Duration,
    /// Bound on each compensation action.
    pub compensation_timeout: Option<Duration>,
    /// When set, an abort also cancels tasks that are already running.
    pub cancel_in_flight_on_abort: bool,
    /// Capacity of the hook event queue.
    pub hook_buffer: usize,
    /// How long the end of a run waits for hooks to catch up.
    pub hook_flush_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: None,
            default_task_timeout: None,
            max_retry_delay: Duration::from_secs(300),
            cancellation_grace: Duration::from_secs(5),
            compensation_timeout: None,
            cancel_in_flight_on_abort: false,
            hook_buffer: 256,
            hook_flush_timeout: Duration::from_secs(1),
        }
    }
}

impl RunOptions {
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == Some(0) {
            return Err(TaskweaveError::validation(
                "concurrency_limit must be at least 1",
            ));
        }
        if self.hook_buffer == 0 {
            return Err(TaskweaveError::validation("hook_buffer must be at least 1"));
        }
        if self.default_task_timeout.is_some_and(|t| t.is_zero()) {
            return Err(TaskweaveError::validation(
                "default_task_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opts = RunOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.concurrency_limit, None);
        assert!(!opts.cancel_in_flight_on_abort);
    }

    #[test]
    fn rejects_degenerate_values() {
        assert!(RunOptions::default().with_concurrency_limit(0).validate().is_err());

        let opts = RunOptions {
            hook_buffer: 0,
            ..RunOptions::default()
        };
        assert!(opts.validate().is_err());

        let opts = RunOptions {
            default_task_timeout: Some(Duration::ZERO),
            ..RunOptions::default()
        };
        assert!(opts.validate().is_err());
    }
}
