// src/exec/batch/substrate.rs

//! The remote execution substrate contract.
//!
//! The batch backend orchestrates a substrate but does not implement one.
//! Production code talks to a REST facade through
//! [`HttpSubstrate`](super::http::HttpSubstrate); tests use an in-memory fake.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;
use crate::exec::batch::descriptor::{JobDescriptor, RemoteId};

/// Raw status counters of one remote unit, as the substrate reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub active: u32,
    #[serde(default)]
    pub succeeded: u32,
    #[serde(default)]
    pub failed: u32,
    /// Failed attempts after which the substrate stops retrying the unit.
    pub backoff_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Active,
    Succeeded,
    Failed,
}

/// A unit has failed only once its own retry budget is used up.
pub fn classify(status: &JobStatus) -> RemoteState {
    if status.succeeded >= 1 {
        RemoteState::Succeeded
    } else if status.failed >= status.backoff_limit.max(1) {
        RemoteState::Failed
    } else {
        RemoteState::Active
    }
}

#[async_trait]
pub trait Substrate: Send + Sync {
    /// Launch one unit per descriptor in a single wire call.
    ///
    /// Returns one id per descriptor, in order.
    async fn submit(&self, chunk: &[JobDescriptor]) -> Result<Vec<RemoteId>>;

    /// Status of every id in a single wire call. Unknown ids may be omitted.
    async fn status(&self, ids: &[RemoteId]) -> Result<HashMap<RemoteId, JobStatus>>;

    /// Structured output of a succeeded unit.
    async fn result(&self, id: &RemoteId) -> Result<Value>;

    /// Diagnostic output, used for failed units.
    async fn logs(&self, id: &RemoteId) -> Result<String>;

    async fn delete(&self, id: &RemoteId) -> Result<()>;
}
