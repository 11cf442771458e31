// src/engine/dispatcher.rs

//! The scheduler loop and the dispatcher-side client operations.
//!
//! `Dispatcher` owns the shared graph store and a background Tokio task that
//! repeatedly promotes Pending tasks, dispatches Ready ones to the backend and
//! lets the backend poll for completions. Callers only touch the store through
//! the methods here.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::model::SchedulerConfig;
use crate::dag::{Function, Payload, StoreStats, TaskFailure};
use crate::engine::sink::{CompletionSink, SharedStore};
use crate::errors::{JobdagError, Result};
use crate::exec::ExecutionBackend;
use crate::types::{TaskId, TaskState};

/// Timing knobs for the scheduler loop and `wait`.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherOptions {
    /// Idle tick of the scheduler loop; enqueues and completions also wake it.
    pub tick: Duration,
    /// How often `wait` re-checks the store.
    pub wait_poll: Duration,
    /// Used by `wait` when the caller passes no timeout.
    pub default_timeout: Option<Duration>,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            wait_poll: Duration::from_millis(20),
            default_timeout: None,
        }
    }
}

impl From<&SchedulerConfig> for DispatcherOptions {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            tick: cfg.tick,
            wait_poll: cfg.wait_poll,
            default_timeout: cfg.default_timeout,
        }
    }
}

pub struct Dispatcher {
    store: SharedStore,
    options: DispatcherOptions,
    stop_tx: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the scheduler loop over `backend`. Must be called inside a Tokio runtime.
    pub fn start(backend: Arc<dyn ExecutionBackend>, options: DispatcherOptions) -> Self {
        let store = SharedStore::new();
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_loop(store.clone(), backend, options.tick, stop_rx));

        Self {
            store,
            options,
            stop_tx,
            loop_handle: Mutex::new(Some(handle)),
        }
    }

    /// Record a task and return its id immediately.
    pub fn run(&self, payload: Payload, deps: Vec<TaskId>) -> Result<TaskId> {
        self.ensure_accepting()?;
        let id = self.store.lock().enqueue(payload, deps)?;
        self.store.wake();
        Ok(id)
    }

    /// Record a batch of tasks under one store lock, then wake the loop once.
    ///
    /// The scheduler sees either none or all of the batch, so a batching
    /// backend receives the whole set in a single dispatch.
    pub fn run_many(&self, items: Vec<(Payload, Vec<TaskId>)>) -> Result<Vec<TaskId>> {
        self.ensure_accepting()?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.store.lock().enqueue_many(items)?;
        self.store.wake();
        Ok(ids)
    }

    /// One task per item, each called with the item as its only argument.
    pub fn map(&self, function: &Function, items: Vec<Value>, deps: &[TaskId]) -> Result<Vec<TaskId>> {
        self.run_many(
            items
                .into_iter()
                .map(|item| (function.with_args(vec![item]), deps.to_vec()))
                .collect(),
        )
    }

    /// One task per row, each row unpacked as the argument list.
    pub fn starmap(
        &self,
        function: &Function,
        rows: Vec<Vec<Value>>,
        deps: &[TaskId],
    ) -> Result<Vec<TaskId>> {
        self.run_many(
            rows.into_iter()
                .map(|row| (function.with_args(row), deps.to_vec()))
                .collect(),
        )
    }

    /// Non-blocking: has `id` resolved successfully?
    pub fn check(&self, id: TaskId) -> bool {
        self.store.lock().check(id)
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.store.lock().state_of(id)
    }

    pub fn stats(&self) -> StoreStats {
        self.store.lock().stats()
    }

    /// Wait for one task; returns its value or its stored failure.
    pub async fn wait(&self, id: TaskId, timeout: Option<Duration>) -> Result<Value> {
        let started = Instant::now();
        let deadline = timeout.or(self.options.default_timeout).map(|t| started + t);

        loop {
            if let Some(err) = self.store.fatal() {
                return Err(err);
            }
            let resolution = self.store.lock().resolution(id)?;
            match resolution {
                Some(Ok(value)) => return Ok(value),
                Some(Err(failure)) => return Err(failure.to_error(id)),
                None => {}
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(JobdagError::Timeout {
                    waited: started.elapsed(),
                    pending: 1,
                });
            }
            tokio::time::sleep(self.options.wait_poll).await;
        }
    }

    pub async fn wait_as<T: DeserializeOwned>(&self, id: TaskId, timeout: Option<Duration>) -> Result<T> {
        let value = self.wait(id, timeout).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Wait for every id, in order.
    ///
    /// Failures are collected until all ids resolve, then raised together as
    /// one `Aggregate` naming each failed id.
    pub async fn wait_all(&self, ids: &[TaskId], timeout: Option<Duration>) -> Result<Vec<Value>> {
        let started = Instant::now();
        let deadline = timeout.or(self.options.default_timeout).map(|t| started + t);

        loop {
            if let Some(err) = self.store.fatal() {
                return Err(err);
            }
            let resolutions = {
                let store = self.store.lock();
                ids.iter()
                    .map(|id| store.resolution(*id))
                    .collect::<Result<Vec<_>>>()?
            };

            let pending = resolutions.iter().filter(|r| r.is_none()).count();
            if pending == 0 {
                return collect_results(ids, resolutions);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(JobdagError::Timeout {
                    waited: started.elapsed(),
                    pending,
                });
            }
            tokio::time::sleep(self.options.wait_poll).await;
        }
    }

    /// Halt new dispatch and wait for the loop task to exit.
    ///
    /// Executions already handed to the backend are not cancelled.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self
            .loop_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler loop task ended abnormally");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    fn ensure_accepting(&self) -> Result<()> {
        if let Some(err) = self.store.fatal() {
            return Err(err);
        }
        if self.is_stopped() {
            warn!("enqueue after stop; the task will not be dispatched");
        }
        Ok(())
    }

    /// The shared store, for tests that need to inspect index sets.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

fn collect_results(
    ids: &[TaskId],
    resolutions: Vec<Option<std::result::Result<Value, TaskFailure>>>,
) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(ids.len());
    let mut failed = Vec::new();

    for (id, resolution) in ids.iter().zip(resolutions) {
        match resolution {
            Some(Ok(value)) => values.push(value),
            Some(Err(failure)) => failed.push((id.to_string(), failure.to_string())),
            None => {}
        }
    }

    if failed.is_empty() {
        Ok(values)
    } else {
        Err(JobdagError::Aggregate { failed })
    }
}

async fn run_loop(
    store: SharedStore,
    backend: Arc<dyn ExecutionBackend>,
    tick: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!(tick_ms = tick.as_millis() as u64, "scheduler loop started");
    let sink = CompletionSink::new(store.clone());
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = store.notified() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        if *stop_rx.borrow() {
            break;
        }
        if store.fatal().is_some() {
            break;
        }

        let step = {
            let mut guard = store.lock();
            let step = guard.step(backend.capacity());
            guard.check_invariants().map(|()| step)
        };
        let step = match step {
            Ok(step) => step,
            Err(JobdagError::SchedulerInvariantViolation(msg)) => {
                store.set_fatal(msg);
                break;
            }
            Err(e) => {
                store.set_fatal(e.to_string());
                break;
            }
        };

        if !step.promoted.is_empty() {
            debug!(promoted = ?step.promoted, "promoted tasks to Ready");
        }
        if !step.dispatched.is_empty() {
            let ids: Vec<TaskId> = step.dispatched.iter().map(|t| t.id).collect();
            if let Err(e) = backend.dispatch(step.dispatched, &sink).await {
                warn!(error = %e, tasks = ?ids, "backend dispatch failed");
                sink.fail_dispatch(&ids, &format!("dispatch failed: {e}"));
            }
        }

        if let Err(e) = backend.poll(&sink).await {
            warn!(error = %e, "backend poll failed; retrying next tick");
        }
    }

    info!("scheduler loop stopped");
}
