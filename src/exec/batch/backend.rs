// src/exec/batch/backend.rs

//! `ExecutionBackend` over a remote batch substrate.
//!
//! `dispatch` describes and submits tasks chunk by chunk and remembers which
//! remote unit runs which task. `poll` (at most once per poll interval)
//! resolves finished units: successes are fetched, decoded as an `Outcome`
//! and deleted; failures report their logs and stay for inspection.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::anyhow;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::dag::{DispatchedTask, Outcome};
use crate::engine::CompletionSink;
use crate::exec::backend::{BackendFuture, ExecutionBackend};
use crate::exec::batch::chunk::chunk_descriptors;
use crate::exec::batch::client::BatchClient;
use crate::exec::batch::descriptor::{JobDescriptor, RemoteId};
use crate::exec::batch::substrate::RemoteState;
use crate::types::TaskId;

pub struct BatchBackend {
    client: BatchClient,
    outstanding: Mutex<HashMap<RemoteId, TaskId>>,
    last_poll: Mutex<Option<Instant>>,
}

impl BatchBackend {
    pub fn new(client: BatchClient) -> Self {
        Self {
            client,
            outstanding: Mutex::new(HashMap::new()),
            last_poll: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &BatchClient {
        &self.client
    }

    /// Remote units submitted and not yet resolved.
    pub fn outstanding(&self) -> usize {
        self.outstanding_map().len()
    }

    fn outstanding_map(&self) -> std::sync::MutexGuard<'_, HashMap<RemoteId, TaskId>> {
        self.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rate limit: true if a status call is due.
    fn poll_due(&self) -> bool {
        let mut last = self.last_poll.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.client.poll_interval() => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    async fn submit(&self, tasks: Vec<DispatchedTask>, sink: &CompletionSink) -> crate::errors::Result<()> {
        let mut descriptors = Vec::with_capacity(tasks.len());
        let mut task_ids = Vec::with_capacity(tasks.len());
        for task in &tasks {
            match JobDescriptor::from_task(task, self.client.resources()) {
                Ok(descriptor) => {
                    descriptors.push(descriptor);
                    task_ids.push(task.id);
                }
                Err(e) => sink.complete(task.id, Err(e)),
            }
        }
        if descriptors.is_empty() {
            return Ok(());
        }

        let chunks = chunk_descriptors(descriptors, self.client.chunk_size(), self.client.max_chunk_bytes())?;

        let mut offset = 0;
        for chunk in chunks {
            let chunk_tasks = &task_ids[offset..offset + chunk.len()];
            offset += chunk.len();

            match self.client.submit_chunk(&chunk).await {
                Ok(remote_ids) => {
                    let mut outstanding = self.outstanding_map();
                    for (remote, task) in remote_ids.into_iter().zip(chunk_tasks) {
                        info!(task = %task, remote = %remote, "submitted remote unit");
                        outstanding.insert(remote, *task);
                    }
                }
                Err(e) => {
                    warn!(error = %e, tasks = ?chunk_tasks, "chunk submission failed");
                    sink.fail_dispatch(chunk_tasks, &format!("submission failed: {e}"));
                }
            }
        }
        Ok(())
    }

    async fn reconcile(&self, sink: &CompletionSink) -> crate::errors::Result<()> {
        let ids: Vec<RemoteId> = self.outstanding_map().keys().cloned().collect();
        if ids.is_empty() || !self.poll_due() {
            return Ok(());
        }

        let states = self.client.poll(&ids).await?;
        for (remote, state) in states {
            if state == RemoteState::Active {
                continue;
            }
            let task = self.outstanding_map().remove(&remote);
            let Some(task) = task else {
                continue;
            };

            match state {
                RemoteState::Succeeded => {
                    let result = self
                        .client
                        .fetch_result(&remote)
                        .await
                        .map(Outcome::from_wire)
                        .map_err(|e| anyhow!("result retrieval for {remote} failed: {e}"));
                    if let Err(e) = self.client.cleanup(&remote).await {
                        warn!(remote = %remote, error = %e, "could not delete succeeded unit");
                    }
                    sink.complete(task, result);
                }
                RemoteState::Failed => {
                    let logs = match self.client.fetch_logs(&remote).await {
                        Ok(logs) => logs,
                        Err(e) => format!("<logs unavailable: {e}>"),
                    };
                    if self.client.delete_failed() {
                        if let Err(e) = self.client.cleanup(&remote).await {
                            warn!(remote = %remote, error = %e, "could not delete failed unit");
                        }
                    }
                    sink.complete(task, Err(anyhow!("remote unit {remote} failed: {logs}")));
                }
                RemoteState::Active => {}
            }
        }
        Ok(())
    }
}

impl ExecutionBackend for BatchBackend {
    fn capacity(&self) -> Option<usize> {
        None
    }

    fn dispatch<'a>(
        &'a self,
        tasks: Vec<DispatchedTask>,
        sink: &'a CompletionSink,
    ) -> BackendFuture<'a> {
        Box::pin(self.submit(tasks, sink))
    }

    fn poll<'a>(&'a self, sink: &'a CompletionSink) -> BackendFuture<'a> {
        Box::pin(self.reconcile(sink))
    }
}
