// src/exec/batch/client.rs

//! Chunked submission, polling, result retrieval and cleanup against a
//! [`Substrate`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{BatchConfig, ResourceDefaults};
use crate::dag::WireOutcome;
use crate::errors::{JobdagError, Result};
use crate::exec::batch::chunk::chunk_descriptors;
use crate::exec::batch::descriptor::{JobDescriptor, RemoteId};
use crate::exec::batch::retry::{with_retries, RetryPolicy};
use crate::exec::batch::substrate::{classify, RemoteState, Substrate};

#[derive(Clone)]
pub struct BatchClient {
    substrate: Arc<dyn Substrate>,
    chunk_size: usize,
    max_chunk_bytes: usize,
    poll_interval: Duration,
    retry: RetryPolicy,
    delete_failed: bool,
    resources: ResourceDefaults,
}

impl BatchClient {
    pub fn new(substrate: Arc<dyn Substrate>, cfg: &BatchConfig) -> Self {
        Self {
            substrate,
            chunk_size: cfg.chunk_size,
            max_chunk_bytes: cfg.max_chunk_bytes,
            poll_interval: cfg.poll_interval,
            retry: RetryPolicy {
                retries: cfg.transient_retries,
                backoff: cfg.retry_backoff,
            },
            delete_failed: cfg.delete_failed,
            resources: cfg.resources.clone(),
        }
    }

    pub fn resources(&self) -> &ResourceDefaults {
        &self.resources
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_chunk_bytes(&self) -> usize {
        self.max_chunk_bytes
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether failed units are deleted by default.
    pub fn delete_failed(&self) -> bool {
        self.delete_failed
    }

    /// Submit every descriptor, one wire call per chunk.
    ///
    /// All chunks are sized before the first call, so `PayloadTooLarge`
    /// submits nothing.
    pub async fn submit_batch(&self, descriptors: Vec<JobDescriptor>) -> Result<Vec<RemoteId>> {
        let chunks = chunk_descriptors(descriptors, self.chunk_size, self.max_chunk_bytes)?;
        let mut ids = Vec::new();
        for chunk in &chunks {
            ids.extend(self.submit_chunk(chunk).await?);
        }
        info!(units = ids.len(), chunks = chunks.len(), "submitted batch");
        Ok(ids)
    }

    /// One submission call, retried on transport failure.
    pub async fn submit_chunk(&self, chunk: &[JobDescriptor]) -> Result<Vec<RemoteId>> {
        let ids = with_retries("submit", self.retry, || self.substrate.submit(chunk)).await?;
        if ids.len() != chunk.len() {
            return Err(JobdagError::Other(anyhow::anyhow!(
                "substrate returned {} ids for a chunk of {}",
                ids.len(),
                chunk.len()
            )));
        }
        Ok(ids)
    }

    /// Classify every id with one status call.
    ///
    /// Ids the substrate does not report yet are taken as Active.
    pub async fn poll(&self, ids: &[RemoteId]) -> Result<HashMap<RemoteId, RemoteState>> {
        let statuses = with_retries("status", self.retry, || self.substrate.status(ids)).await?;
        Ok(ids
            .iter()
            .map(|id| {
                let state = match statuses.get(id) {
                    Some(status) => classify(status),
                    None => {
                        debug!(remote = %id, "no status reported yet; treating as active");
                        RemoteState::Active
                    }
                };
                (id.clone(), state)
            })
            .collect())
    }

    pub async fn fetch_result(&self, id: &RemoteId) -> Result<Value> {
        with_retries("result", self.retry, || self.substrate.result(id)).await
    }

    pub async fn fetch_logs(&self, id: &RemoteId) -> Result<String> {
        with_retries("logs", self.retry, || self.substrate.logs(id)).await
    }

    /// Delete the remote resource of a unit.
    pub async fn cleanup(&self, id: &RemoteId) -> Result<()> {
        with_retries("delete", self.retry, || self.substrate.delete(id)).await?;
        debug!(remote = %id, "deleted remote unit");
        Ok(())
    }

    /// Wait for every id to resolve, collecting results in order.
    ///
    /// Succeeded units are fetched and deleted as soon as they are seen.
    /// Failed units have their logs captured and are only deleted when
    /// `delete_failed` is set. Failures are raised together once nothing is
    /// active. A timeout leaves every outstanding unit in place.
    pub async fn wait_all(
        &self,
        ids: &[RemoteId],
        timeout: Option<Duration>,
        delete_failed: bool,
    ) -> Result<Vec<Value>> {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let unique: Vec<RemoteId> = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();
        let mut outstanding = unique.clone();
        let mut results: HashMap<RemoteId, Value> = HashMap::new();
        let mut failures: HashMap<RemoteId, String> = HashMap::new();

        while !outstanding.is_empty() {
            match self.poll(&outstanding).await {
                Ok(states) => {
                    let mut resolved = HashSet::new();
                    for id in &outstanding {
                        match states.get(id).copied().unwrap_or(RemoteState::Active) {
                            RemoteState::Active => {}
                            RemoteState::Succeeded => {
                                match self.collect_success(id).await {
                                    Ok(value) => {
                                        results.insert(id.clone(), value);
                                    }
                                    Err(message) => {
                                        failures.insert(id.clone(), message);
                                    }
                                }
                                resolved.insert(id.clone());
                            }
                            RemoteState::Failed => {
                                let message = self.collect_failure(id, delete_failed).await;
                                failures.insert(id.clone(), message);
                                resolved.insert(id.clone());
                            }
                        }
                    }
                    outstanding.retain(|id| !resolved.contains(id));
                }
                Err(e) => warn!(error = %e, "poll tick failed; retrying next tick"),
            }

            if outstanding.is_empty() {
                break;
            }
            if timeout.is_some_and(|t| started.elapsed() >= t) {
                warn!(pending = outstanding.len(), "wait timed out; leaving remote units in place");
                return Err(JobdagError::Timeout {
                    waited: started.elapsed(),
                    pending: outstanding.len(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        if !failures.is_empty() {
            let failed = unique
                .iter()
                .filter_map(|id| failures.remove(id).map(|msg| (id.to_string(), msg)))
                .collect();
            return Err(JobdagError::Aggregate { failed });
        }

        // A repeated id gets its value once per occurrence.
        Ok(ids
            .iter()
            .filter_map(|id| results.get(id).cloned())
            .collect())
    }

    /// Submit one unit per item and wait for all of them.
    pub async fn map(
        &self,
        function: &str,
        items: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Value>> {
        let descriptors = items
            .into_iter()
            .map(|item| JobDescriptor::new(function, vec![item], &self.resources))
            .collect();
        let ids = self.submit_batch(descriptors).await?;
        self.wait_all(&ids, timeout, self.delete_failed).await
    }

    /// Fetch and delete a succeeded unit; the `Err` string is the failure reason.
    async fn collect_success(&self, id: &RemoteId) -> std::result::Result<Value, String> {
        let raw = self
            .fetch_result(id)
            .await
            .map_err(|e| format!("result retrieval failed: {e}"))?;
        if let Err(e) = self.cleanup(id).await {
            warn!(remote = %id, error = %e, "could not delete succeeded unit");
        }
        match serde_json::from_value::<WireOutcome>(raw.clone()) {
            Ok(WireOutcome::Final { value }) => Ok(value),
            Ok(WireOutcome::Continuation { .. }) => {
                Err("unit returned a continuation outside the scheduler".to_string())
            }
            Err(_) => Ok(raw),
        }
    }

    /// Capture the diagnostic of a failed unit.
    async fn collect_failure(&self, id: &RemoteId, delete: bool) -> String {
        let logs = match self.fetch_logs(id).await {
            Ok(logs) => logs,
            Err(e) => format!("<logs unavailable: {e}>"),
        };
        warn!(remote = %id, "remote unit failed");
        if delete {
            if let Err(e) = self.cleanup(id).await {
                warn!(remote = %id, error = %e, "could not delete failed unit");
            }
        }
        logs
    }
}
