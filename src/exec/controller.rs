// src/exec/controller.rs

//! Per-task execution controller: timeout, retry/backoff and cooperative
//! cancellation around a task's execute function.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::ExecutionRecord;
use crate::exec::retry::RetryPolicy;
use crate::task::{ExecutionContext, Task, TaskError, TaskOutcome};

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq)]
enum AttemptResult {
    Succeeded,
    Failed(TaskError),
    /// Carries the reason when the engine cancelled the attempt (timeout or
    /// run cancellation); `None` when the body reported cancellation itself.
    Cancelled(Option<TaskError>),
}

/// Runs one dispatched task to a terminal [`ExecutionRecord`].
///
/// The controller holds a concurrency permit only while an attempt is
/// running; it is released during backoff and re-acquired before the next
/// attempt.
pub struct ExecutionController {
    task: Task,
    timeout: Option<Duration>,
    ctx: ExecutionContext,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    events: mpsc::Sender<RuntimeEvent>,
    retry: RetryPolicy,
    grace: Duration,
}

impl ExecutionController {
    pub fn new(
        scheduled: ScheduledTask,
        ctx: ExecutionContext,
        cancel: CancellationToken,
        permits: Arc<Semaphore>,
        events: mpsc::Sender<RuntimeEvent>,
        max_retry_delay: Duration,
        grace: Duration,
    ) -> Self {
        let ScheduledTask { task, timeout } = scheduled;
        let retry = RetryPolicy::new(task.max_retry_count(), task.retry_delay(), max_retry_delay);
        Self {
            task,
            timeout,
            ctx,
            cancel,
            permits,
            events,
            retry,
            grace,
        }
    }

    /// Run on the Tokio runtime and report the record as
    /// [`RuntimeEvent::TaskFinished`].
    pub fn spawn(self, permit: OwnedSemaphorePermit) {
        tokio::spawn(async move {
            let events = self.events.clone();
            let record = self.run(permit).await;
            if let Err(err) = events.send(RuntimeEvent::TaskFinished(record)).await {
                warn!(error = %err, "run loop gone; dropping task completion");
            }
        });
    }

    /// Drive attempts until one succeeds, retries are exhausted, or the task
    /// is cancelled. `permit` covers the first attempt.
    pub async fn run(self, permit: OwnedSemaphorePermit) -> ExecutionRecord {
        let name = self.task.name().to_string();
        let started_at = SystemTime::now();
        let mut permit = Some(permit);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let held = match permit.take() {
                Some(p) => p,
                None => {
                    let acquired = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        p = Arc::clone(&self.permits).acquire_owned() => p.ok(),
                    };
                    match acquired {
                        Some(p) => p,
                        None => {
                            info!(task = %name, attempt, "cancelled while waiting for a slot");
                            return ExecutionRecord::cancelled(&name, attempt - 1, Some(run_cancelled()))
                                .with_started_at(started_at);
                        }
                    }
                }
            };

            self.emit(RuntimeEvent::AttemptStarted {
                task: name.clone(),
                attempt,
            })
            .await;

            let result = self.run_attempt(attempt).await;
            drop(held);

            match result {
                AttemptResult::Succeeded => {
                    info!(task = %name, attempt, "task attempt succeeded");
                    return ExecutionRecord::succeeded(&name, attempt).with_started_at(started_at);
                }
                AttemptResult::Cancelled(reason) => {
                    info!(
                        task = %name,
                        attempt,
                        reason = ?reason.as_ref().map(TaskError::message),
                        "task attempt cancelled"
                    );
                    return ExecutionRecord::cancelled(&name, attempt, reason).with_started_at(started_at);
                }
                AttemptResult::Failed(error) => {
                    if !self.retry.should_retry(attempt) {
                        warn!(task = %name, attempt, error = %error, "task failed; retries exhausted");
                        self.emit(RuntimeEvent::AttemptFailed {
                            task: name.clone(),
                            attempt,
                            error: error.clone(),
                            retry_in: None,
                        })
                        .await;
                        return ExecutionRecord::failed(&name, attempt, error).with_started_at(started_at);
                    }

                    let delay = self.retry.delay_for(attempt - 1);
                    warn!(
                        task = %name,
                        attempt,
                        error = %error,
                        retry_in = ?delay,
                        "task attempt failed; retrying"
                    );
                    self.emit(RuntimeEvent::AttemptFailed {
                        task: name.clone(),
                        attempt,
                        error: error.clone(),
                        retry_in: Some(delay),
                    })
                    .await;

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            info!(task = %name, attempt, "cancelled during backoff");
                            return ExecutionRecord::cancelled(&name, attempt, Some(run_cancelled()))
                                .with_started_at(started_at);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn run_attempt(&self, attempt: u32) -> AttemptResult {
        let name = self.task.name();
        if self.cancel.is_cancelled() {
            return AttemptResult::Cancelled(Some(run_cancelled()));
        }

        let token = self.cancel.child_token();
        let fut = (self.task.execute)(self.ctx.clone(), token.clone());
        let mut fut = AssertUnwindSafe(fut).catch_unwind();

        let deadline = async {
            match self.timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        debug!(task = %name, attempt, timeout = ?self.timeout, "running attempt");

        // Cancellation wins over a body that finishes in the same poll.
        let reason = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => run_cancelled(),
            _ = &mut deadline => {
                let timeout = self.timeout.unwrap_or_default();
                warn!(task = %name, attempt, ?timeout, "task attempt timed out");
                TaskError::new(format!("timed out after {timeout:?}"))
            }
            res = &mut fut => {
                return match res {
                    Ok(TaskOutcome::Success) => AttemptResult::Succeeded,
                    Ok(TaskOutcome::Failed(err)) => AttemptResult::Failed(err),
                    Ok(TaskOutcome::Cancelled) => AttemptResult::Cancelled(None),
                    Err(panic) => AttemptResult::Failed(TaskError::from_panic(panic)),
                };
            }
        };

        token.cancel();
        if tokio::time::timeout(self.grace, fut).await.is_err() {
            warn!(
                task = %name,
                attempt,
                grace = ?self.grace,
                "task ignored cancellation past the grace period; abandoning it"
            );
        }
        AttemptResult::Cancelled(Some(reason))
    }

    async fn emit(&self, event: RuntimeEvent) {
        if let Err(err) = self.events.send(event).await {
            debug!(error = %err, "run loop gone; dropping attempt event");
        }
    }
}

fn run_cancelled() -> TaskError {
    TaskError::new("run cancelled")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::task::TaskBuilder;
    use crate::types::TaskState;

    fn controller(
        task: Task,
        cancel: CancellationToken,
    ) -> (ExecutionController, mpsc::Receiver<RuntimeEvent>, Arc<Semaphore>) {
        let (tx, rx) = mpsc::channel(64);
        let permits = Arc::new(Semaphore::new(1));
        let c = ExecutionController::new(
            ScheduledTask::new(task, None),
            ExecutionContext::new(),
            cancel,
            Arc::clone(&permits),
            tx,
            Duration::from_secs(60),
            Duration::from_millis(50),
        );
        (c, rx, permits)
    }

    fn failing_until(succeed_on: u32, retries: u32) -> (Task, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let mut b = TaskBuilder::create("flaky").unwrap();
        b.with_max_retry_count(retries)
            .with_retry_delay(Duration::from_secs(1))
            .with_execution(move |_ctx, _cancel| {
                let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n >= succeed_on {
                        TaskOutcome::Success
                    } else {
                        TaskOutcome::failed(format!("attempt {n} failed"))
                    }
                }
            });
        (b.build().unwrap(), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_backoff_then_succeeds() {
        let (task, calls) = failing_until(3, 5);
        let (c, mut rx, permits) = controller(task, CancellationToken::new());
        let permit = Arc::clone(&permits).acquire_owned().await.unwrap();

        let started = tokio::time::Instant::now();
        let record = c.run(permit).await;

        assert_eq!(record.state, TaskState::Succeeded);
        assert_eq!(record.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));

        let mut retry_in = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let RuntimeEvent::AttemptFailed { retry_in: d, .. } = ev {
                retry_in.push(d);
            }
        }
        assert_eq!(
            retry_in,
            vec![Some(Duration::from_secs(1)), Some(Duration::from_secs(2))]
        );
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_with_last_error() {
        let (task, calls) = failing_until(u32::MAX, 2);
        let (c, _rx, permits) = controller(task, CancellationToken::new());
        let permit = Arc::clone(&permits).acquire_owned().await.unwrap();

        let record = c.run(permit).await;
        assert_eq!(record.state, TaskState::Failed);
        assert_eq!(record.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(record.last_error.unwrap().message(), "attempt 3 failed");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_the_attempt_without_retry() {
        let mut b = TaskBuilder::create("slow").unwrap();
        b.with_max_retry_count(3)
            .with_timeout(Duration::from_millis(100))
            .unwrap()
            .with_execution(|_ctx, cancel: CancellationToken| async move {
                cancel.cancelled().await;
                TaskOutcome::Success
            });
        let (c, _rx, permits) = controller(b.build().unwrap(), CancellationToken::new());
        let permit = Arc::clone(&permits).acquire_owned().await.unwrap();

        let record = c.run(permit).await;
        assert_eq!(record.state, TaskState::Cancelled);
        assert_eq!(record.attempts, 1);
        assert!(record.last_error.unwrap().message().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_is_terminal() {
        let (task, calls) = failing_until(u32::MAX, 10);
        let cancel = CancellationToken::new();
        let (c, _rx, permits) = controller(task, cancel.clone());
        let permit = Arc::clone(&permits).acquire_owned().await.unwrap();

        let handle = tokio::spawn(c.run(permit));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();

        let record = handle.await.unwrap();
        assert_eq!(record.state, TaskState::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_body_is_a_failure() {
        let mut b = TaskBuilder::create("boom").unwrap();
        b.with_execution(|_ctx, _cancel| async {
            if true {
                panic!("kaboom");
            }
            TaskOutcome::Success
        });
        let (c, _rx, permits) = controller(b.build().unwrap(), CancellationToken::new());
        let permit = Arc::clone(&permits).acquire_owned().await.unwrap();

        let record = c.run(permit).await;
        assert_eq!(record.state, TaskState::Failed);
        assert!(record.last_error.unwrap().message().contains("kaboom"));
    }
}
