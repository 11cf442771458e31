// src/errors.rs

//! Crate-wide error type.
//!
//! Per-task failures (`ExecutionFailed`, `DependencyFailed`) are stored in the
//! graph store as [`TaskFailure`](crate::dag::TaskFailure) values and turned
//! into a `JobdagError` only when a caller waits on the task.

use std::time::Duration;

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum JobdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("task {task} not run: dependency {dependency} failed")]
    DependencyFailed { task: String, dependency: String },

    #[error("task {task} failed: {message}")]
    ExecutionFailed { task: String, message: String },

    #[error("timed out after {waited:?} waiting for {pending} unresolved task(s)")]
    Timeout { waited: Duration, pending: usize },

    #[error(
        "chunk {chunk} serializes to {bytes} bytes, above the {limit} byte ceiling; reduce chunk_size"
    )]
    PayloadTooLarge {
        chunk: usize,
        bytes: usize,
        limit: usize,
    },

    #[error("substrate call `{operation}` failed after {attempts} attempt(s): {message}")]
    TransientSubstrateError {
        operation: &'static str,
        attempts: u32,
        message: String,
    },

    #[error("scheduler invariant violated: {0}")]
    SchedulerInvariantViolation(String),

    #[error("continuation of task {task} would create a dependency cycle")]
    DependencyCycle { task: TaskId },

    #[error("{} task(s) failed: {}", failed.len(), summarize(failed))]
    Aggregate { failed: Vec<(String, String)> },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobdagError {
    /// Ids named by this error: every failed id for `Aggregate`, the single
    /// task for per-task errors, nothing otherwise.
    pub fn failed_ids(&self) -> Vec<String> {
        match self {
            JobdagError::Aggregate { failed } => failed.iter().map(|(id, _)| id.clone()).collect(),
            JobdagError::DependencyFailed { task, .. } | JobdagError::ExecutionFailed { task, .. } => {
                vec![task.clone()]
            }
            _ => Vec::new(),
        }
    }
}

fn summarize(failed: &[(String, String)]) -> String {
    failed
        .iter()
        .map(|(id, reason)| format!("{id} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobdagError>;
