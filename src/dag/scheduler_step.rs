// src/dag/scheduler_step.rs

//! Step-by-step result types for the graph store.

use serde::{Deserialize, Serialize};

use crate::dag::task::DispatchedTask;
use crate::types::TaskId;

/// Structured result of a single scheduler "step".
///
/// Tests can drive the store by hand and assert on what changed.
#[derive(Debug, Clone)]
pub struct SchedulerStep {
    /// Tasks moved from Pending to Ready in this step.
    pub promoted: Vec<TaskId>,
    /// Tasks moved from Ready to Running; the caller must hand them to a backend.
    pub dispatched: Vec<DispatchedTask>,
    /// Whether nothing is pending, ready or running after this step.
    pub idle: bool,
}

/// Sizes of the store's index sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}
