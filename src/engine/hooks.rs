// src/engine/hooks.rs

//! Transition hooks: a fire-and-forget feed of state changes for callers that
//! persist or display execution history.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::dag::Transition;
use crate::task::{TaskError, TaskOutcome};
use crate::types::{TaskName, TaskState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    StateChanged {
        task: TaskName,
        from: TaskState,
        to: TaskState,
        at: SystemTime,
    },
    AttemptStarted {
        task: TaskName,
        attempt: u32,
    },
    AttemptFailed {
        task: TaskName,
        attempt: u32,
        error: TaskError,
        /// `None` when no retry follows.
        retry_in: Option<Duration>,
    },
    CompensationFinished {
        task: TaskName,
        outcome: TaskOutcome,
    },
}

impl TaskEvent {
    pub fn task(&self) -> &str {
        match self {
            TaskEvent::StateChanged { task, .. }
            | TaskEvent::AttemptStarted { task, .. }
            | TaskEvent::AttemptFailed { task, .. }
            | TaskEvent::CompensationFinished { task, .. } => task,
        }
    }
}

impl From<Transition> for TaskEvent {
    fn from(t: Transition) -> Self {
        TaskEvent::StateChanged {
            task: t.task,
            from: t.from,
            to: t.to,
            at: t.at,
        }
    }
}
/// Receives [`TaskEvent`]s from a running engine.
///
/// Called from a dedicated OS thread, never from the scheduling loop or a
/// runtime worker, so a hook may block without stalling scheduling. It can
/// lose events if it falls behind by more than the configured buffer. A
/// panicking hook is logged and skipped; the other hooks still see the event.
pub trait TransitionHook: Send + Sync + 'static {
    fn on_event(&self, event: &TaskEvent);
}

impl<F> TransitionHook for F
where
    F: Fn(&TaskEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &TaskEvent) {
        self(event)
    }
}

fn deliver(hooks: &[Arc<dyn TransitionHook>], event: &TaskEvent) {
    for (index, hook) in hooks.iter().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| hook.on_event(event))).is_err() {
            warn!(hook = index, task = %event.task(), "transition hook panicked; event skipped for this hook");
        }
    }
}

/// Sending half used by the run loop.
#[derive(Debug)]
pub(crate) struct HookPublisher {
    tx: Option<mpsc::Sender<TaskEvent>>,
    /// Disconnects when the worker thread exits.
    done: Option<std_mpsc::Receiver<()>>,
}

impl HookPublisher {
    /// A publisher that discards everything.
    pub(crate) fn disabled() -> Self {
        Self { tx: None, done: None }
    }

    pub(crate) fn spawn(hooks: Vec<Arc<dyn TransitionHook>>, buffer: usize) -> Self {
        if hooks.is_empty() {
            return Self::disabled();
        }

        let (tx, mut rx) = mpsc::channel::<TaskEvent>(buffer);
        let (done_tx, done_rx) = std_mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("taskweave-hooks".into())
            .spawn(move || {
                let _done = done_tx;
                while let Some(event) = rx.blocking_recv() {
                    deliver(&hooks, &event);
                }
                debug!("hook channel closed; hook worker exiting");
            });

        match spawned {
            Ok(_) => Self {
                tx: Some(tx),
                done: Some(done_rx),
            },
            Err(e) => {
                warn!(error = %e, "failed to start hook worker thread; hooks disabled");
                Self::disabled()
            }
        }
    }

    pub(crate) fn publish(&self, event: TaskEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(task = %event.task(), "hook queue full; dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("hook worker gone; dropping event");
            }
        }
    }

    pub(crate) fn publish_all(&self, transitions: Vec<Transition>) {
        for t in transitions {
            self.publish(t.into());
        }
    }

    /// Close the queue and wait up to `timeout` of wall-clock time for queued
    /// events to be delivered. A worker still busy after that is detached.
    pub(crate) async fn flush(mut self, timeout: Duration) {
        drop(self.tx.take());
        let Some(done) = self.done.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || done.recv_timeout(timeout)).await {
            Ok(Err(RecvTimeoutError::Timeout)) => {
                warn!(?timeout, "hook worker did not drain in time; detaching it");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "waiting for hook worker failed"),
        }
    }
}
