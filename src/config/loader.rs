// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::Result;

/// Load a workflow file from a given path and return the raw `RawWorkflowFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let workflow: RawWorkflowFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), tasks = workflow.task.len(), "workflow file parsed");

    Ok(workflow)
}

/// Load a workflow file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - at least one task,
///   - well-formed durations,
///   - sane `[engine]` options.
///
/// Dependency and cycle errors are reported when the graph is built
/// ([`WorkflowFile::build_graph`]).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowFile> {
    let raw = load_from_path(&path)?;
    WorkflowFile::try_from(raw)
}

/// `Taskweave.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskweave.toml")
}
