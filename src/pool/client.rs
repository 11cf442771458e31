// src/pool/client.rs

//! Pool client: round-robin submission, status polled from the KV store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::dag::{Function, Payload};
use crate::errors::{JobdagError, Result};
use crate::exec::FunctionRegistry;
use crate::kv::{HttpKvStore, KvStore, MemoryKvStore};
use crate::pool::service::HttpWorker;
use crate::pool::status::{PoolTaskId, PoolTaskStatus, StatusEntry};
use crate::pool::worker::{Worker, WorkerEndpoint};

pub struct WorkerPool {
    workers: Vec<Arc<dyn WorkerEndpoint>>,
    kv: Arc<dyn KvStore>,
    assignments: DashMap<PoolTaskId, usize>,
    next_worker: AtomicUsize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        workers: Vec<Arc<dyn WorkerEndpoint>>,
        kv: Arc<dyn KvStore>,
        poll_interval: Duration,
    ) -> Result<Self> {
        if workers.is_empty() {
            return Err(JobdagError::ConfigError(
                "a worker pool needs at least one worker".to_string(),
            ));
        }
        info!(workers = workers.len(), "worker pool ready");
        Ok(Self {
            workers,
            kv,
            assignments: DashMap::new(),
            next_worker: AtomicUsize::new(0),
            poll_interval,
        })
    }

    /// Start `n` in-process workers sharing `kv`.
    pub fn in_process(
        n: usize,
        registry: Arc<FunctionRegistry>,
        kv: Arc<dyn KvStore>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let workers = (0..n)
            .map(|i| {
                Arc::new(Worker::start(format!("worker-{i}"), registry.clone(), kv.clone()))
                    as Arc<dyn WorkerEndpoint>
            })
            .collect();
        Self::new(workers, kv, poll_interval)
    }

    /// Remote workers when `worker_urls` is set, in-process ones otherwise.
    pub fn from_config(cfg: &PoolConfig, registry: Arc<FunctionRegistry>) -> Result<Self> {
        let kv: Arc<dyn KvStore> = match &cfg.kvs_url {
            Some(url) => Arc::new(HttpKvStore::new(url.clone())),
            None => Arc::new(MemoryKvStore::new()),
        };

        if cfg.worker_urls.is_empty() {
            return Self::in_process(cfg.workers, registry, kv, cfg.poll_interval);
        }
        if cfg.kvs_url.is_none() {
            return Err(JobdagError::ConfigError(
                "[pool].worker_urls requires [pool].kvs_url so remote workers can publish status"
                    .to_string(),
            ));
        }
        let workers = cfg
            .worker_urls
            .iter()
            .map(|url| Arc::new(HttpWorker::new(url.clone())) as Arc<dyn WorkerEndpoint>)
            .collect();
        Self::new(workers, kv, cfg.poll_interval)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Submit one task to the next worker in round-robin order.
    pub async fn run(&self, payload: Payload) -> Result<PoolTaskId> {
        let index = self.next_worker.fetch_add(1, Ordering::SeqCst) % self.workers.len();
        let worker = &self.workers[index];
        let id = PoolTaskId::new();

        worker.submit(id, payload).await?;
        self.assignments.insert(id, index);
        debug!(task = %id, worker = worker.name(), "assigned task");
        Ok(id)
    }

    pub async fn map(&self, function: &Function, items: Vec<Value>) -> Result<Vec<PoolTaskId>> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            ids.push(self.run(function.with_args(vec![item])).await?);
        }
        Ok(ids)
    }

    pub async fn starmap(&self, function: &Function, rows: Vec<Vec<Value>>) -> Result<Vec<PoolTaskId>> {
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(self.run(function.with_args(row)).await?);
        }
        Ok(ids)
    }

    /// Index of the worker a task was assigned to.
    pub fn worker_of(&self, id: PoolTaskId) -> Option<usize> {
        self.assignments.get(&id).map(|w| *w)
    }

    /// Latest published record; Pending until the worker's first write lands.
    pub async fn entry(&self, id: PoolTaskId) -> Result<StatusEntry> {
        if !self.assignments.contains_key(&id) {
            return Err(JobdagError::TaskNotFound(id.to_string()));
        }
        match self.kv.get(&id.to_string()).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(StatusEntry::pending()),
        }
    }

    pub async fn status(&self, id: PoolTaskId) -> Result<PoolTaskStatus> {
        Ok(self.entry(id).await?.status)
    }

    /// `Some(value)` once complete, `None` while pending or running.
    pub async fn result(&self, id: PoolTaskId) -> Result<Option<Value>> {
        let entry = self.entry(id).await?;
        match entry.status {
            PoolTaskStatus::Complete => Ok(Some(entry.result.unwrap_or(Value::Null))),
            PoolTaskStatus::Failed => Err(JobdagError::ExecutionFailed {
                task: id.to_string(),
                message: entry.error.unwrap_or_default(),
            }),
            PoolTaskStatus::Pending | PoolTaskStatus::Running => Ok(None),
        }
    }

    pub async fn check(&self, id: PoolTaskId) -> Result<bool> {
        Ok(self.status(id).await? == PoolTaskStatus::Complete)
    }

    /// Wait for every id; failures are raised together once all resolve.
    pub async fn wait(&self, ids: &[PoolTaskId], timeout: Option<Duration>) -> Result<Vec<Value>> {
        let started = Instant::now();
        let mut resolved: Vec<Option<StatusEntry>> = vec![None; ids.len()];

        loop {
            for (slot, id) in resolved.iter_mut().zip(ids) {
                if slot.is_some() {
                    continue;
                }
                match self.entry(*id).await {
                    Ok(entry) if entry.status.is_terminal() => *slot = Some(entry),
                    Ok(_) => {}
                    Err(e @ JobdagError::TaskNotFound(_)) => return Err(e),
                    Err(e) => warn!(task = %id, error = %e, "status poll failed; retrying"),
                }
            }

            let pending = resolved.iter().filter(|e| e.is_none()).count();
            if pending == 0 {
                break;
            }
            if timeout.is_some_and(|t| started.elapsed() >= t) {
                return Err(JobdagError::Timeout {
                    waited: started.elapsed(),
                    pending,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        let mut values = Vec::with_capacity(ids.len());
        let mut failed = Vec::new();
        for (id, entry) in ids.iter().zip(resolved.into_iter().flatten()) {
            match entry.status {
                PoolTaskStatus::Complete => values.push(entry.result.unwrap_or(Value::Null)),
                _ => failed.push((id.to_string(), entry.error.unwrap_or_default())),
            }
        }
        if !failed.is_empty() {
            return Err(JobdagError::Aggregate { failed });
        }
        Ok(values)
    }

    pub async fn wait_one(&self, id: PoolTaskId, timeout: Option<Duration>) -> Result<Value> {
        match self.wait(&[id], timeout).await {
            Ok(mut values) => Ok(values.pop().unwrap_or(Value::Null)),
            Err(JobdagError::Aggregate { mut failed }) => {
                let (task, message) = failed.pop().unwrap_or_default();
                Err(JobdagError::ExecutionFailed { task, message })
            }
            Err(e) => Err(e),
        }
    }

    /// Close every worker after it drains its queue.
    pub async fn close(&self) -> Result<()> {
        for worker in &self.workers {
            if let Err(e) = worker.close().await {
                warn!(worker = worker.name(), error = %e, "could not close worker");
            }
        }
        Ok(())
    }
}
