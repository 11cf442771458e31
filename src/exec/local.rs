// src/exec/local.rs

//! Local backend: a bounded rayon pool inside the scheduler process.
//!
//! Each dispatched task runs on a pool thread; the completion callback
//! re-acquires the store lock from that thread.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::dag::{DispatchedTask, Outcome, TaskSpawner};
use crate::engine::CompletionSink;
use crate::errors::{JobdagError, Result};
use crate::exec::backend::{BackendFuture, ExecutionBackend};
use crate::exec::registry::FunctionRegistry;

pub struct LocalBackend {
    pool: ThreadPool,
    size: usize,
    registry: Arc<FunctionRegistry>,
}

impl LocalBackend {
    pub fn new(size: usize, registry: Arc<FunctionRegistry>) -> Result<Self> {
        if size == 0 {
            return Err(JobdagError::ConfigError(
                "local pool size must be at least 1".to_string(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("jobdag-local-{i}"))
            .build()
            .map_err(|e| JobdagError::ConfigError(format!("failed to build local pool: {e}")))?;
        Ok(Self {
            pool,
            size,
            registry,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl ExecutionBackend for LocalBackend {
    fn capacity(&self) -> Option<usize> {
        Some(self.size)
    }

    fn dispatch<'a>(
        &'a self,
        tasks: Vec<DispatchedTask>,
        sink: &'a CompletionSink,
    ) -> BackendFuture<'a> {
        for task in tasks {
            let sink = sink.clone();
            let registry = self.registry.clone();
            self.pool.spawn(move || {
                debug!(task = %task.id, "running task on local pool");
                let result = execute(&registry, &task, Some(sink.spawner()));
                sink.complete(task.id, result);
            });
        }
        Box::pin(async { Ok(()) })
    }
}

/// Run one dispatched task to an outcome, turning a panic into an error.
pub(crate) fn execute(
    registry: &FunctionRegistry,
    task: &DispatchedTask,
    spawner: Option<Arc<dyn TaskSpawner>>,
) -> anyhow::Result<Outcome> {
    let ctx = task.context(spawner);
    match catch_unwind(AssertUnwindSafe(|| registry.invoke(&ctx, &task.payload))) {
        Ok(result) => result,
        Err(panic) => Err(anyhow!("task panicked: {}", panic_message(panic.as_ref()))),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Payload;
    use crate::types::TaskId;
    use std::collections::BTreeMap;

    fn dispatched(payload: Payload) -> DispatchedTask {
        DispatchedTask {
            id: TaskId(0),
            payload,
            deps: vec![],
            dep_results: BTreeMap::new(),
            generation: 0,
        }
    }

    #[test]
    fn panic_becomes_execution_error() {
        let registry = FunctionRegistry::new();
        let task = dispatched(Payload::thunk(|_| panic!("kaboom")));
        let err = execute(&registry, &task, None).unwrap_err();
        assert_eq!(err.to_string(), "task panicked: kaboom");
    }

    #[test]
    fn zero_sized_pool_is_rejected() {
        let err = LocalBackend::new(0, Arc::new(FunctionRegistry::new())).err();
        assert!(matches!(err, Some(JobdagError::ConfigError(_))));
    }
}
