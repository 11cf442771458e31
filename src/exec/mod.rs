// src/exec/mod.rs

//! Execution backends.
//!
//! - [`backend`] defines the `ExecutionBackend` trait the scheduler loop uses.
//! - [`registry`] maps function names to callables for shippable payloads.
//! - [`local`] runs payloads on a bounded in-process pool.
//! - [`batch`] ships payloads to a remote batch-job substrate.

pub mod backend;
pub mod batch;
pub mod local;
pub mod registry;

pub use backend::{BackendFuture, ExecutionBackend};
pub use local::LocalBackend;
pub use registry::FunctionRegistry;
