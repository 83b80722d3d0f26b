// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::RunOptions;
use crate::types::TaskName;

/// Workflow file as read from TOML, before validation.
///
/// ```toml
/// [engine]
/// concurrency = 2
/// default_timeout = "10m"
///
/// [task.build]
/// cmd = "cargo build --release"
/// retries = 2
/// retry_delay = "500ms"
///
/// [task.deploy]
/// cmd = "./deploy.sh"
/// after = ["build"]
/// compensate = "./rollback.sh"
/// when = "deploy"
/// ```
///
/// All sections are optional; validation requires at least one task.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWorkflowFile {
    /// Engine settings from `[engine]`.
    #[serde(default)]
    pub engine: EngineSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[engine]` section. Durations are strings such as `"3s"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Maximum tasks in flight; unbounded when absent.
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub default_timeout: Option<String>,
    #[serde(default)]
    pub max_retry_delay: Option<String>,
    #[serde(default)]
    pub cancellation_grace: Option<String>,
    #[serde(default)]
    pub compensation_timeout: Option<String>,
    #[serde(default)]
    pub cancel_in_flight_on_abort: bool,
    #[serde(default)]
    pub hook_buffer: Option<usize>,
    #[serde(default)]
    pub hook_flush_timeout: Option<String>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Shell command to execute.
    pub cmd: String,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub retries: u32,

    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub estimated_duration: Option<String>,

    #[serde(default)]
    pub continue_on_failure: bool,

    /// Shell command that undoes `cmd`, run if the workflow aborts after this
    /// task succeeded.
    #[serde(default)]
    pub compensate: Option<String>,

    /// Name of a context property (`--set KEY=VALUE`) that must be truthy for
    /// the task to run.
    #[serde(default)]
    pub when: Option<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A validated task entry with parsed durations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub name: TaskName,
    pub cmd: String,
    pub after: Vec<TaskName>,
    pub retries: u32,
    pub retry_delay: Duration,
    pub timeout: Option<Duration>,
    pub priority: i32,
    pub estimated_duration: Option<Duration>,
    pub continue_on_failure: bool,
    pub compensate: Option<String>,
    pub when: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Validated workflow file.
///
/// Construct it through `TryFrom<RawWorkflowFile>` (see `validate.rs`) or
/// [`load_and_validate`](crate::config::load_and_validate).
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub options: RunOptions,
    /// Sorted by task name.
    pub tasks: Vec<TaskSettings>,
}

impl WorkflowFile {
    pub(crate) fn new_unchecked(options: RunOptions, tasks: Vec<TaskSettings>) -> Self {
        Self { options, tasks }
    }

    pub fn task(&self, name: &str) -> Option<&TaskSettings> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
