// src/engine/sink.rs

//! Shared handle on the graph store, and the completion callback backends use.
//!
//! This is the only cross-thread boundary in the dispatcher: pool threads and
//! backend poll loops re-acquire the single store mutex to record outcomes.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::dag::{GraphStore, Outcome, Payload, TaskFailure, TaskSpawner};
use crate::engine::resolver::{resolve, Resolution};
use crate::errors::{JobdagError, Result};
use crate::types::{TaskId, TaskState};

/// The graph store behind its one lock, plus the loop's wake-up signal.
#[derive(Clone, Debug, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<GraphStore>>,
    wake: Arc<Notify>,
    fatal: Arc<OnceLock<String>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, GraphStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake the scheduler loop before its next tick.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    /// Record an unrecoverable invariant violation. The first one wins.
    pub fn set_fatal(&self, message: String) {
        error!(%message, "scheduler invariant violated; halting dispatch");
        let _ = self.fatal.set(message);
        self.wake();
    }

    pub fn fatal(&self) -> Option<JobdagError> {
        self.fatal
            .get()
            .map(|msg| JobdagError::SchedulerInvariantViolation(msg.clone()))
    }
}

impl TaskSpawner for SharedStore {
    fn spawn(&self, payload: Payload, deps: Vec<TaskId>) -> Result<TaskId> {
        let id = self.lock().enqueue(payload, deps)?;
        self.wake();
        Ok(id)
    }
}

/// Completion callback handed to execution backends.
#[derive(Clone, Debug)]
pub struct CompletionSink {
    store: SharedStore,
}

impl CompletionSink {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Spawner for in-process task contexts.
    pub fn spawner(&self) -> Arc<dyn TaskSpawner> {
        Arc::new(self.store.clone())
    }

    /// Report the raw outcome of running a task's payload.
    pub fn complete(&self, id: TaskId, result: anyhow::Result<Outcome>) {
        let resolution = {
            let mut store = self.store.lock();
            resolve(&mut store, id, result)
        };

        match resolution {
            Ok(Resolution::Done) => debug!(task = %id, "completion recorded"),
            Ok(Resolution::Rearmed { deps }) => {
                debug!(task = %id, ?deps, "completion re-armed task")
            }
            Ok(Resolution::Failed { newly_failed }) => {
                debug!(task = %id, ?newly_failed, "completion recorded failure")
            }
            Err(JobdagError::SchedulerInvariantViolation(msg)) => self.store.set_fatal(msg),
            Err(e) => warn!(task = %id, error = %e, "could not record completion"),
        }

        self.store.wake();
    }

    /// Fail tasks whose hand-off to the backend failed as a whole.
    ///
    /// Tasks the backend already resolved individually are left alone.
    pub fn fail_dispatch(&self, ids: &[TaskId], message: &str) {
        {
            let mut store = self.store.lock();
            for id in ids {
                if store.state_of(*id) != Some(TaskState::Running) {
                    continue;
                }
                let failure = TaskFailure::Execution {
                    message: message.to_string(),
                };
                if let Err(e) = store.fail(*id, failure) {
                    warn!(task = %id, error = %e, "could not fail task after dispatch error");
                }
            }
        }
        self.store.wake();
    }
}
