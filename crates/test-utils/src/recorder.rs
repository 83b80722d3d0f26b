use std::sync::{Arc, Mutex};

use taskweave::engine::TaskEvent;

/// Shared, append-only log of strings that fake tasks and hooks write into.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries that start with `prefix`, with the prefix stripped.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    /// Position of the first occurrence of `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    /// A transition hook that records `"<task>:<from>-><to>"` for state
    /// changes and `"<task>:attempt <n>"` for attempt starts.
    pub fn hook(&self) -> impl Fn(&TaskEvent) + Send + Sync + 'static {
        let recorder = self.clone();
        move |event: &TaskEvent| match event {
            TaskEvent::StateChanged { task, from, to, .. } => {
                recorder.push(format!("{task}:{from}->{to}"))
            }
            TaskEvent::AttemptStarted { task, attempt } => {
                recorder.push(format!("{task}:attempt {attempt}"))
            }
            TaskEvent::AttemptFailed { task, attempt, .. } => {
                recorder.push(format!("{task}:failed {attempt}"))
            }
            TaskEvent::CompensationFinished { task, outcome } => {
                recorder.push(format!("{task}:compensated {}", outcome.is_success()))
            }
        }
    }
}
