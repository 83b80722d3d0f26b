// src/exec/command.rs

//! Shell-command task bodies.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::task::{CompensationFn, ExecuteFn, ExecutionContext, TaskFuture, TaskOutcome};

/// Execute function that runs `cmd` through the platform shell.
///
/// Context properties are exported to the child as `TASKWEAVE_<KEY>`
/// environment variables. Cancellation kills the child process.
pub fn shell_task(task: impl Into<String>, cmd: impl Into<String>) -> ExecuteFn {
    let task = task.into();
    let cmd = cmd.into();
    Arc::new(move |ctx: ExecutionContext, cancel: CancellationToken| -> TaskFuture {
        let task = task.clone();
        let cmd = cmd.clone();
        Box::pin(async move { run_command(&task, &cmd, &ctx, Some(cancel)).await })
    })
}

/// Compensation function that runs `cmd` through the platform shell.
pub fn shell_compensation(task: impl Into<String>, cmd: impl Into<String>) -> CompensationFn {
    let task = task.into();
    let cmd = cmd.into();
    Arc::new(move |ctx: ExecutionContext| -> TaskFuture {
        let task = task.clone();
        let cmd = cmd.clone();
        Box::pin(async move { run_command(&task, &cmd, &ctx, None).await })
    })
}

async fn run_command(
    task: &str,
    cmd: &str,
    ctx: &ExecutionContext,
    cancel: Option<CancellationToken>,
) -> TaskOutcome {
    match run_command_inner(task, cmd, ctx, cancel).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(task = %task, error = %err, "task process error");
            TaskOutcome::failed(err)
        }
    }
}

async fn run_command_inner(
    task: &str,
    cmd: &str,
    ctx: &ExecutionContext,
    cancel: Option<CancellationToken>,
) -> Result<TaskOutcome> {
    info!(task = %task, cmd = %cmd, "starting task process");

    // Build a shell command appropriate for the platform.
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    for (key, value) in ctx.properties() {
        command.env(env_key(key), value);
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for task '{task}'"))?;

    // Always consume output so pipe buffers don't fill; log at debug.
    if let Some(stdout) = child.stdout.take() {
        let task = task.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let task = task.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, "stderr: {}", line);
            }
        });
    }

    let cancelled = async {
        match &cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        status = child.wait() => {
            let status = status.with_context(|| format!("waiting for process of task '{task}'"))?;
            let code = status.code().unwrap_or(-1);
            info!(task = %task, exit_code = code, success = status.success(), "task process exited");

            if status.success() {
                Ok(TaskOutcome::Success)
            } else {
                Ok(TaskOutcome::failed(format!("command exited with status {code}")))
            }
        }
        _ = cancelled => {
            info!(task = %task, "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(task = %task, error = %e, "failed to kill child process on cancellation");
            }
            Ok(TaskOutcome::Cancelled)
        }
    }
}

/// `deploy-env` -> `TASKWEAVE_DEPLOY_ENV`.
fn env_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("TASKWEAVE_{cleaned}")
}
