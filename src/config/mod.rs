// src/config/mod.rs

//! Workflow files for taskweave.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a workflow file from disk (`loader.rs`).
//! - Validate it and parse durations (`validate.rs`, `duration.rs`).
//! - Turn it into a task graph of shell commands (`build.rs`).

pub mod build;
pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{EngineSection, RawWorkflowFile, TaskConfig, TaskSettings, WorkflowFile};
pub use validate::validate_config;
