// src/exec/backend.rs

//! Pluggable execution backend abstraction.
//!
//! The scheduler loop talks to an `ExecutionBackend` instead of a concrete
//! substrate. Each backend receives the tasks the store just moved to Running
//! and reports every outcome back through the [`CompletionSink`]:
//!
//! - [`LocalBackend`](super::local::LocalBackend) runs payloads on a bounded
//!   thread pool and reports from pool threads.
//! - [`BatchBackend`](super::batch::BatchBackend) ships named payloads to a
//!   remote substrate and reports from `poll`.
//! - Tests can provide their own backend that records dispatches and completes
//!   tasks directly.

use std::future::Future;
use std::pin::Pin;

use crate::dag::DispatchedTask;
use crate::engine::CompletionSink;
use crate::errors::Result;

/// Boxed future returned by backend operations.
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait abstracting how dispatched tasks are executed.
pub trait ExecutionBackend: Send + Sync {
    /// Upper bound on the running set, or `None` when the substrate decides.
    fn capacity(&self) -> Option<usize>;

    /// Hand tasks over for execution.
    ///
    /// An `Err` fails every task in `tasks` that the backend did not already
    /// resolve through `sink`.
    fn dispatch<'a>(
        &'a self,
        tasks: Vec<DispatchedTask>,
        sink: &'a CompletionSink,
    ) -> BackendFuture<'a>;

    /// Called once per scheduler tick after dispatch.
    ///
    /// Backends that learn about completions by polling report them here.
    fn poll<'a>(&'a self, _sink: &'a CompletionSink) -> BackendFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}
