// src/dag/mod.rs

//! Task records and the dependency graph store.
//!
//! - [`task`] holds the task record, payload, outcome and context types.
//! - [`store`] is the authoritative pending/ready/running/done partition.
//! - [`invariants`] checks that partition and detects continuation cycles.
//! - [`scheduler_step`] defines the result type of one store step.

pub mod invariants;
pub mod scheduler_step;
pub mod store;
pub mod task;

pub use scheduler_step::{SchedulerStep, StoreStats};
pub use store::GraphStore;
pub use task::{
    DispatchedTask, Function, Outcome, Payload, TaskContext, TaskFailure, TaskFn, TaskRecord,
    TaskSpawner, WireOutcome,
};
