// src/pool/worker.rs

//! Long-lived worker: a FIFO admission queue drained by a monitor loop.
//!
//! The monitor pops the oldest queued task, publishes Running, executes it on
//! the blocking pool and publishes Complete or Failed with the outcome. The
//! same records are kept locally so a worker service can answer status
//! queries without going through the store.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::{DispatchedTask, Outcome, Payload};
use crate::errors::{JobdagError, Result};
use crate::exec::local::{execute, panic_message};
use crate::exec::FunctionRegistry;
use crate::kv::KvStore;
use crate::pool::status::{PoolTaskId, PoolTaskStatus, StatusEntry};
use crate::types::TaskId;

/// Where the pool client sends work.
#[async_trait]
pub trait WorkerEndpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Admit a task under `id`. Returns once Pending has been published.
    async fn submit(&self, id: PoolTaskId, payload: Payload) -> Result<()>;

    /// Stop after draining already admitted tasks.
    async fn close(&self) -> Result<()>;
}

struct WorkerShared {
    name: String,
    queue: Mutex<VecDeque<(PoolTaskId, Payload)>>,
    wake: Notify,
    closing: AtomicBool,
    records: DashMap<PoolTaskId, StatusEntry>,
    executed: AtomicU64,
    registry: Arc<FunctionRegistry>,
    kv: Arc<dyn KvStore>,
}

/// In-process worker. Clones share the same queue and monitor loop.
#[derive(Clone)]
pub struct Worker {
    shared: Arc<WorkerShared>,
    monitor: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Worker {
    /// Start the monitor loop. Must be called inside a Tokio runtime.
    pub fn start(name: impl Into<String>, registry: Arc<FunctionRegistry>, kv: Arc<dyn KvStore>) -> Self {
        let shared = Arc::new(WorkerShared {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            closing: AtomicBool::new(false),
            records: DashMap::new(),
            executed: AtomicU64::new(0),
            registry,
            kv,
        });
        let handle = tokio::spawn(monitor_loop(shared.clone()));
        Self {
            shared,
            monitor: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Tasks admitted but not yet started.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn status(&self, id: PoolTaskId) -> Option<PoolTaskStatus> {
        self.shared.records.get(&id).map(|e| e.status)
    }

    pub fn entry(&self, id: PoolTaskId) -> Option<StatusEntry> {
        self.shared.records.get(&id).map(|e| e.value().clone())
    }

    pub fn is_closing(&self) -> bool {
        self.shared.closing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerEndpoint for Worker {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn submit(&self, id: PoolTaskId, payload: Payload) -> Result<()> {
        if self.is_closing() {
            return Err(JobdagError::ConfigError(format!(
                "worker {} is closed",
                self.shared.name
            )));
        }
        publish(&self.shared, id, StatusEntry::pending()).await;

        // `close` may have finished while Pending was being published; the
        // flag is only trusted under the queue lock the monitor exits under.
        let admitted = {
            let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let open = !self.is_closing();
            if open {
                queue.push_back((id, payload));
            }
            open
        };
        if !admitted {
            warn!(worker = %self.shared.name, task = %id, "worker closed during admission");
            publish(&self.shared, id, StatusEntry::failed("worker closed before the task started")).await;
            return Err(JobdagError::ConfigError(format!(
                "worker {} is closed",
                self.shared.name
            )));
        }
        self.shared.wake.notify_one();
        debug!(worker = %self.shared.name, task = %id, "admitted task");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        {
            let _queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            self.shared.closing.store(true, Ordering::SeqCst);
        }
        self.shared.wake.notify_one();
        let handle = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(worker = %self.shared.name, error = %e, "monitor loop ended abnormally");
            }
        }
        info!(worker = %self.shared.name, "worker closed");
        Ok(())
    }
}

async fn monitor_loop(shared: Arc<WorkerShared>) {
    info!(worker = %shared.name, "worker monitor started");
    loop {
        let next = {
            let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            match queue.pop_front() {
                Some(item) => Some(Some(item)),
                None if shared.closing.load(Ordering::SeqCst) => None,
                None => Some(None),
            }
        };

        match next {
            Some(Some((id, payload))) => run_one(&shared, id, payload).await,
            Some(None) => shared.wake.notified().await,
            None => break,
        }
    }
    info!(worker = %shared.name, "worker monitor stopped");
}

async fn run_one(shared: &Arc<WorkerShared>, id: PoolTaskId, payload: Payload) {
    publish(shared, id, StatusEntry::running()).await;

    let seq = shared.executed.fetch_add(1, Ordering::SeqCst);
    let registry = shared.registry.clone();
    let task = DispatchedTask {
        id: TaskId(seq),
        payload,
        deps: Vec::new(),
        dep_results: BTreeMap::new(),
        generation: 0,
    };

    let joined = tokio::task::spawn_blocking(move || execute(&registry, &task, None)).await;
    let entry = match joined {
        Ok(Ok(Outcome::Final(value))) => StatusEntry::complete(value),
        Ok(Ok(Outcome::Continuation { .. })) => StatusEntry::failed(
            "continuations need the dependency-graph scheduler; use the local or batch backend",
        ),
        Ok(Err(e)) => StatusEntry::failed(format!("{e:#}")),
        Err(e) if e.is_panic() => {
            StatusEntry::failed(format!("task panicked: {}", panic_message(e.into_panic().as_ref())))
        }
        Err(e) => StatusEntry::failed(format!("task aborted: {e}")),
    };

    match entry.status {
        PoolTaskStatus::Complete => info!(worker = %shared.name, task = %id, "task complete"),
        _ => warn!(worker = %shared.name, task = %id, error = ?entry.error, "task failed"),
    }
    publish(shared, id, entry).await;
}

async fn publish(shared: &WorkerShared, id: PoolTaskId, entry: StatusEntry) {
    shared.records.insert(id, entry.clone());
    let value = match serde_json::to_value(&entry) {
        Ok(value) => value,
        Err(e) => {
            warn!(task = %id, error = %e, "could not encode status entry");
            return;
        }
    };
    if let Err(e) = shared.kv.put(&id.to_string(), value).await {
        warn!(worker = %shared.name, task = %id, error = %e, "could not publish status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use serde_json::json;
    use std::time::Duration;

    async fn settle(worker: &Worker, id: PoolTaskId) -> StatusEntry {
        for _ in 0..200 {
            if let Some(entry) = worker.entry(id) {
                if entry.status.is_terminal() {
                    return entry;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} did not finish");
    }

    #[tokio::test]
    async fn publishes_result_to_store() {
        let kv = MemoryKvStore::new();
        let worker = Worker::start("w0", Arc::new(FunctionRegistry::new()), Arc::new(kv.clone()));

        let id = PoolTaskId::new();
        worker
            .submit(id, Payload::value_fn(|_| Ok("Hooray")))
            .await
            .unwrap();

        assert_eq!(settle(&worker, id).await, StatusEntry::complete(json!("Hooray")));
        let published = kv.get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(published, json!({"status": "COMPLETE", "result": "Hooray"}));
        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn failure_is_published_not_swallowed() {
        let kv = MemoryKvStore::new();
        let worker = Worker::start("w0", Arc::new(FunctionRegistry::new()), Arc::new(kv));

        let id = PoolTaskId::new();
        worker
            .submit(id, Payload::thunk(|_| Err(anyhow::anyhow!("division by zero"))))
            .await
            .unwrap();

        let entry = settle(&worker, id).await;
        assert_eq!(entry.status, PoolTaskStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("division by zero"));
        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_drains_queue_then_rejects() {
        let kv = MemoryKvStore::new();
        let worker = Worker::start("w0", Arc::new(FunctionRegistry::new()), Arc::new(kv));

        let ids: Vec<PoolTaskId> = (0..3).map(|_| PoolTaskId::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            worker.submit(*id, Payload::value_fn(move |_| Ok(i))).await.unwrap();
        }
        worker.close().await.unwrap();

        for id in &ids {
            assert_eq!(worker.status(*id), Some(PoolTaskStatus::Complete));
        }
        assert!(worker.submit(PoolTaskId::new(), Payload::value_fn(|_| Ok(0))).await.is_err());
    }

    /// Holds every Pending publish until the gate opens.
    struct GatedKv {
        inner: MemoryKvStore,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl KvStore for GatedKv {
        async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
            if value == json!({"status": "PENDING"}) {
                self.gate.notified().await;
            }
            self.inner.put(key, value).await
        }

        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
            self.inner.get(key).await
        }

        async fn all(&self) -> Result<std::collections::HashMap<String, serde_json::Value>> {
            self.inner.all().await
        }
    }

    #[tokio::test]
    async fn close_during_admission_fails_the_task_instead_of_stranding_it() {
        let gate = Arc::new(Notify::new());
        let kv = MemoryKvStore::new();
        let gated = GatedKv { inner: kv.clone(), gate: gate.clone() };
        let worker = Worker::start("w0", Arc::new(FunctionRegistry::new()), Arc::new(gated));

        let id = PoolTaskId::new();
        let admitting = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.submit(id, Payload::value_fn(|_| Ok(1))).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        worker.close().await.unwrap();
        gate.notify_one();

        assert!(admitting.await.unwrap().is_err());
        assert_eq!(worker.status(id), Some(PoolTaskStatus::Failed));
        let published = kv.get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(published["status"], json!("FAILED"));
    }
}
