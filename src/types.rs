use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a task in the dependency graph store.
///
/// Ids are assigned monotonically by the store and stay stable across any
/// number of continuation hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle state of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Waiting for one or more dependencies to be done.
    Pending,
    /// Every dependency is done; waiting for dispatch capacity.
    Ready,
    /// Handed to an execution backend.
    Running,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

/// Which execution substrate the client talks to.
///
/// - `Local`: dependency-graph scheduler over an in-process thread pool.
/// - `Batch`: dependency-graph scheduler over a remote batch-job substrate.
/// - `Pool`: long-lived workers draining FIFO queues, no dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Batch,
    Pool,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Local
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "batch" => Ok(BackendKind::Batch),
            "pool" => Ok(BackendKind::Pool),
            other => Err(format!(
                "invalid backend: {other} (expected \"local\", \"batch\" or \"pool\")"
            )),
        }
    }
}
