use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jobdag::dag::{Payload, TaskContext};
use jobdag::errors::{JobdagError, Result};
use jobdag::exec::batch::{JobDescriptor, JobStatus, RemoteId, Substrate};
use jobdag::exec::FunctionRegistry;
use jobdag::types::TaskId;
use serde_json::Value;

struct FakeJob {
    descriptor: JobDescriptor,
    output: std::result::Result<Value, String>,
    polls: u32,
}

/// An in-memory substrate that:
/// - runs each descriptor's function from a registry at submit time
/// - reports it Active for the first `polls_until_done` status queries
/// - then reports Succeeded or Failed (with the error as its logs)
/// - records submit calls, status calls and deletions
pub struct FakeSubstrate {
    registry: Arc<FunctionRegistry>,
    jobs: Mutex<HashMap<RemoteId, FakeJob>>,
    deleted: Mutex<Vec<RemoteId>>,
    submitted_chunks: Mutex<Vec<usize>>,
    next_id: AtomicU64,
    polls_until_done: u32,
    failures_left: AtomicU32,
    status_calls: AtomicU32,
}

impl FakeSubstrate {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            jobs: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            submitted_chunks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            polls_until_done: 0,
            failures_left: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
        }
    }

    pub fn with_polls_until_done(mut self, polls: u32) -> Self {
        self.polls_until_done = polls;
        self
    }

    /// Make the next `n` calls (of any kind) fail with a transient error.
    pub fn fail_next_calls(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Number of descriptors in each `submit` call, in call order.
    pub fn submitted_chunks(&self) -> Vec<usize> {
        self.submitted_chunks.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.submitted_chunks.lock().unwrap().len()
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<RemoteId> {
        self.deleted.lock().unwrap().clone()
    }

    /// Ids of units that have not been deleted.
    pub fn live_jobs(&self) -> Vec<RemoteId> {
        let mut ids: Vec<RemoteId> = self.jobs.lock().unwrap().keys().cloned().collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        ids
    }

    fn injected_failure(&self, operation: &'static str) -> Result<()> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(JobdagError::TransientSubstrateError {
                operation,
                attempts: 1,
                message: "injected outage".to_string(),
            });
        }
        Ok(())
    }

    fn execute(&self, descriptor: &JobDescriptor) -> std::result::Result<Value, String> {
        let deps: Vec<TaskId> = descriptor.dep_results.keys().copied().collect();
        let ctx = TaskContext::new(TaskId(0), deps, descriptor.dep_results.clone(), None);
        let payload = Payload::call(descriptor.function.clone(), descriptor.args.clone());

        let outcome = self
            .registry
            .invoke(&ctx, &payload)
            .map_err(|e| format!("{e:#}"))?;
        let wire = outcome.to_wire().map_err(|e| format!("{e:#}"))?;
        serde_json::to_value(wire).map_err(|e| e.to_string())
    }

    fn lookup<T>(&self, id: &RemoteId, f: impl FnOnce(&FakeJob) -> T) -> Result<T> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(id)
            .map(f)
            .ok_or_else(|| JobdagError::TaskNotFound(id.to_string()))
    }
}

#[async_trait]
impl Substrate for FakeSubstrate {
    async fn submit(&self, chunk: &[JobDescriptor]) -> Result<Vec<RemoteId>> {
        self.injected_failure("submit")?;
        self.submitted_chunks.lock().unwrap().push(chunk.len());

        let mut ids = Vec::with_capacity(chunk.len());
        for descriptor in chunk {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let id = RemoteId(format!("{}-{n:04}", descriptor.name));
            let output = self.execute(descriptor);
            self.jobs.lock().unwrap().insert(
                id.clone(),
                FakeJob {
                    descriptor: descriptor.clone(),
                    output,
                    polls: 0,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn status(&self, ids: &[RemoteId]) -> Result<HashMap<RemoteId, JobStatus>> {
        self.injected_failure("status")?;
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let mut jobs = self.jobs.lock().unwrap();
        let mut out = HashMap::new();
        for id in ids {
            let Some(job) = jobs.get_mut(id) else {
                continue;
            };
            let backoff_limit = job.descriptor.backoff_limit;
            let status = if job.polls < self.polls_until_done {
                job.polls += 1;
                JobStatus {
                    active: 1,
                    succeeded: 0,
                    failed: 0,
                    backoff_limit,
                }
            } else if job.output.is_ok() {
                JobStatus {
                    active: 0,
                    succeeded: 1,
                    failed: 0,
                    backoff_limit,
                }
            } else {
                JobStatus {
                    active: 0,
                    succeeded: 0,
                    failed: backoff_limit.max(1),
                    backoff_limit,
                }
            };
            out.insert(id.clone(), status);
        }
        Ok(out)
    }

    async fn result(&self, id: &RemoteId) -> Result<Value> {
        self.injected_failure("result")?;
        self.lookup(id, |job| job.output.clone())?
            .map_err(|e| JobdagError::Other(anyhow::anyhow!("unit {id} has no result: {e}")))
    }

    async fn logs(&self, id: &RemoteId) -> Result<String> {
        self.injected_failure("logs")?;
        self.lookup(id, |job| match &job.output {
            Ok(_) => String::new(),
            Err(e) => e.clone(),
        })
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        self.injected_failure("delete")?;
        if self.jobs.lock().unwrap().remove(id).is_some() {
            self.deleted.lock().unwrap().push(id.clone());
        }
        Ok(())
    }
}
