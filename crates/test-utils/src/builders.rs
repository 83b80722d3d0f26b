#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use taskweave::dag::DependencyGraph;
use taskweave::task::{ExecutionContext, Task, TaskBuilder, TaskOutcome};
use tokio_util::sync::CancellationToken;

use crate::recorder::Recorder;

/// What a fake task body does on each attempt.
#[derive(Debug, Clone, Copy)]
enum Body {
    Succeed,
    /// Fail the first `n` attempts, then succeed.
    FailTimes(u32),
    AlwaysFail,
    /// Sleep, then succeed. Ignores cancellation unless `cooperative`.
    Sleep { duration: Duration, cooperative: bool },
    /// Block until cancelled, then report the given outcome.
    WaitForCancel { then: Then },
    Panic,
}

#[derive(Debug, Clone, Copy)]
enum Then {
    Cancelled,
    Success,
}

#[derive(Debug, Clone, Copy)]
enum Compensation {
    Succeed,
    Fail,
    Panic,
}

/// Builder for scripted tasks used in engine tests.
///
/// With a [`Recorder`] attached, the task logs `"start:<name>"` at the
/// beginning of every attempt, `"done:<name>"` when an attempt succeeds and
/// `"comp:<name>"` when its compensation runs.
#[derive(Debug, Clone)]
pub struct FakeTask {
    name: String,
    after: Vec<String>,
    body: Body,
    recorder: Option<Recorder>,
    retries: u32,
    retry_delay: Duration,
    timeout: Option<Duration>,
    priority: i32,
    continue_on_failure: bool,
    condition: Option<bool>,
    condition_key: Option<String>,
    compensation: Option<Compensation>,
}

impl FakeTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            after: Vec::new(),
            body: Body::Succeed,
            recorder: None,
            retries: 0,
            retry_delay: Duration::ZERO,
            timeout: None,
            priority: 0,
            continue_on_failure: false,
            condition: None,
            condition_key: None,
            compensation: None,
        }
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.after.extend(deps.iter().map(|d| d.to_string()));
        self
    }

    pub fn recorder(mut self, recorder: &Recorder) -> Self {
        self.recorder = Some(recorder.clone());
        self
    }

    pub fn fails_times(mut self, n: u32) -> Self {
        self.body = Body::FailTimes(n);
        self
    }

    pub fn always_fails(mut self) -> Self {
        self.body = Body::AlwaysFail;
        self
    }

    /// Sleep for `duration` without looking at the cancellation token.
    pub fn sleeps(mut self, duration: Duration) -> Self {
        self.body = Body::Sleep {
            duration,
            cooperative: false,
        };
        self
    }

    /// Sleep for `duration`, returning `Cancelled` early if the token fires.
    pub fn sleeps_cooperatively(mut self, duration: Duration) -> Self {
        self.body = Body::Sleep {
            duration,
            cooperative: true,
        };
        self
    }

    pub fn waits_for_cancel(mut self) -> Self {
        self.body = Body::WaitForCancel {
            then: Then::Cancelled,
        };
        self
    }

    /// Wait for cancellation and then claim success anyway.
    pub fn waits_for_cancel_then_succeeds(mut self) -> Self {
        self.body = Body::WaitForCancel {
            then: Then::Success,
        };
        self
    }

    pub fn panics(mut self) -> Self {
        self.body = Body::Panic;
        self
    }

    pub fn retries(mut self, n: u32, delay: Duration) -> Self {
        self.retries = n;
        self.retry_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    /// Constant condition.
    pub fn condition(mut self, value: bool) -> Self {
        self.condition = Some(value);
        self
    }

    /// Run only if the context property `key` is truthy.
    pub fn when(mut self, key: &str) -> Self {
        self.condition_key = Some(key.to_string());
        self
    }

    pub fn compensated(mut self) -> Self {
        self.compensation = Some(Compensation::Succeed);
        self
    }

    pub fn compensation_fails(mut self) -> Self {
        self.compensation = Some(Compensation::Fail);
        self
    }

    pub fn compensation_panics(mut self) -> Self {
        self.compensation = Some(Compensation::Panic);
        self
    }

    pub fn build(self) -> Task {
        let mut builder = TaskBuilder::create(self.name.clone()).expect("valid fake task name");
        builder
            .with_max_retry_count(self.retries)
            .with_retry_delay(self.retry_delay)
            .with_priority(self.priority)
            .continue_on_failure(self.continue_on_failure)
            .with_dependencies(self.after.iter().cloned())
            .expect("valid fake dependencies");

        if let Some(timeout) = self.timeout {
            builder.with_timeout(timeout).expect("valid fake timeout");
        }
        if let Some(value) = self.condition {
            builder.with_condition(move |_| value);
        }
        if let Some(key) = self.condition_key.clone() {
            builder.with_condition(move |ctx: &ExecutionContext| ctx.is_truthy(&key));
        }

        let name = self.name.clone();
        let recorder = self.recorder.clone();
        let body = self.body;
        let calls = Arc::new(AtomicU32::new(0));
        builder.with_execution(move |_ctx: ExecutionContext, cancel: CancellationToken| {
            let name = name.clone();
            let recorder = recorder.clone();
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if let Some(r) = &recorder {
                    r.push(format!("start:{name}"));
                }
                let outcome = run_body(body, attempt, cancel).await;
                if let (Some(r), TaskOutcome::Success) = (&recorder, &outcome) {
                    r.push(format!("done:{name}"));
                }
                outcome
            }
        });

        if let Some(compensation) = self.compensation {
            let name = self.name.clone();
            let recorder = self.recorder.clone();
            builder.with_compensation_action(move |_ctx: ExecutionContext| {
                let name = name.clone();
                let recorder = recorder.clone();
                async move {
                    if let Some(r) = &recorder {
                        r.push(format!("comp:{name}"));
                    }
                    match compensation {
                        Compensation::Succeed => TaskOutcome::Success,
                        Compensation::Fail => TaskOutcome::failed(format!("cannot undo {name}")),
                        Compensation::Panic => panic!("compensation for {name} exploded"),
                    }
                }
            });
        }

        builder.build().expect("fake task has an execution function")
    }
}

async fn run_body(body: Body, attempt: u32, cancel: CancellationToken) -> TaskOutcome {
    match body {
        Body::Succeed => TaskOutcome::Success,
        Body::FailTimes(n) if attempt <= n => TaskOutcome::failed(format!("attempt {attempt} failed")),
        Body::FailTimes(_) => TaskOutcome::Success,
        Body::AlwaysFail => TaskOutcome::failed(format!("attempt {attempt} failed")),
        Body::Sleep {
            duration,
            cooperative: false,
        } => {
            tokio::time::sleep(duration).await;
            TaskOutcome::Success
        }
        Body::Sleep {
            duration,
            cooperative: true,
        } => {
            tokio::select! {
                _ = cancel.cancelled() => TaskOutcome::Cancelled,
                _ = tokio::time::sleep(duration) => TaskOutcome::Success,
            }
        }
        Body::WaitForCancel { then } => {
            cancel.cancelled().await;
            match then {
                Then::Cancelled => TaskOutcome::Cancelled,
                Then::Success => TaskOutcome::Success,
            }
        }
        Body::Panic => panic!("task body exploded on attempt {attempt}"),
    }
}

/// Collect tasks into an unsealed graph.
pub fn graph_of(tasks: impl IntoIterator<Item = Task>) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for task in tasks {
        graph.add_task(task).expect("unique fake task names");
    }
    graph
}
