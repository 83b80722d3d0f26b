// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{EngineSection, RawWorkflowFile, TaskConfig, TaskSettings, WorkflowFile};
use crate::engine::RunOptions;
use crate::errors::{Result, TaskweaveError};

impl TryFrom<RawWorkflowFile> for WorkflowFile {
    type Error = TaskweaveError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        let options = engine_options(&raw.engine)?;
        let tasks = raw
            .task
            .into_iter()
            .map(|(name, cfg)| task_settings(name, cfg))
            .collect::<Result<Vec<_>>>()?;
        Ok(WorkflowFile::new_unchecked(options, tasks))
    }
}

/// Validate a raw file without keeping the result.
pub fn validate_config(raw: &RawWorkflowFile) -> Result<()> {
    WorkflowFile::try_from(raw.clone()).map(|_| ())
}

fn ensure_has_tasks(cfg: &RawWorkflowFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskweaveError::ConfigError(
            "workflow must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn engine_options(engine: &EngineSection) -> Result<RunOptions> {
    let defaults = RunOptions::default();
    let options = RunOptions {
        concurrency_limit: engine.concurrency,
        default_task_timeout: optional_duration("[engine].default_timeout", &engine.default_timeout)?,
        max_retry_delay: optional_duration("[engine].max_retry_delay", &engine.max_retry_delay)?
            .unwrap_or(defaults.max_retry_delay),
        cancellation_grace: optional_duration(
            "[engine].cancellation_grace",
            &engine.cancellation_grace,
        )?
        .unwrap_or(defaults.cancellation_grace),
        compensation_timeout: optional_duration(
            "[engine].compensation_timeout",
            &engine.compensation_timeout,
        )?,
        cancel_in_flight_on_abort: engine.cancel_in_flight_on_abort,
        hook_buffer: engine.hook_buffer.unwrap_or(defaults.hook_buffer),
        hook_flush_timeout: optional_duration(
            "[engine].hook_flush_timeout",
            &engine.hook_flush_timeout,
        )?
        .unwrap_or(defaults.hook_flush_timeout),
    };

    options
        .validate()
        .map_err(|e| TaskweaveError::ConfigError(format!("[engine]: {e}")))?;
    Ok(options)
}

fn task_settings(name: String, cfg: TaskConfig) -> Result<TaskSettings> {
    if name.trim().is_empty() {
        return Err(TaskweaveError::ConfigError(
            "task names must not be empty".to_string(),
        ));
    }
    if cfg.cmd.trim().is_empty() {
        return Err(TaskweaveError::ConfigError(format!(
            "task '{name}' has an empty `cmd`"
        )));
    }
    if cfg.compensate.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(TaskweaveError::ConfigError(format!(
            "task '{name}' has an empty `compensate` command"
        )));
    }

    let field = |key: &str| format!("task '{name}' `{key}`");
    let timeout = optional_duration(&field("timeout"), &cfg.timeout)?;
    if timeout.is_some_and(|t| t.is_zero()) {
        return Err(TaskweaveError::ConfigError(format!(
            "{} must be greater than zero",
            field("timeout")
        )));
    }
    let retry_delay = optional_duration(&field("retry_delay"), &cfg.retry_delay)?.unwrap_or_default();
    let estimated_duration = optional_duration(&field("estimated_duration"), &cfg.estimated_duration)?;

    Ok(TaskSettings {
        name,
        cmd: cfg.cmd,
        after: cfg.after,
        retries: cfg.retries,
        retry_delay,
        timeout,
        priority: cfg.priority,
        estimated_duration,
        continue_on_failure: cfg.continue_on_failure,
        compensate: cfg.compensate,
        when: cfg.when,
        metadata: cfg.metadata,
    })
}

fn optional_duration(what: &str, value: &Option<String>) -> Result<Option<Duration>> {
    value
        .as_deref()
        .map(|s| {
            parse_duration(s)
                .map_err(|e| TaskweaveError::ConfigError(format!("{what}: {e}")))
        })
        .transpose()
}
