// src/exec/batch/descriptor.rs

//! Remote execution descriptors.
//!
//! A descriptor is everything a substrate needs to launch one unit: a
//! registered function name, its JSON arguments, the values of the task's
//! dependencies, and the resource envelope from `[batch]`.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{ResourceDefaults, VolumeConfig};
use crate::dag::DispatchedTask;
use crate::types::TaskId;

/// Name of a remote unit as reported by the substrate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        RemoteId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// `job-` followed by 8 hex characters.
    pub name: String,
    pub function: String,
    pub args: Vec<Value>,
    #[serde(default)]
    pub dep_results: BTreeMap<TaskId, Value>,
    pub image: String,
    pub image_pull_policy: String,
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
    pub backoff_limit: u32,
}

impl JobDescriptor {
    pub fn new(function: impl Into<String>, args: Vec<Value>, resources: &ResourceDefaults) -> Self {
        Self {
            name: job_name(),
            function: function.into(),
            args,
            dep_results: BTreeMap::new(),
            image: resources.image.clone(),
            image_pull_policy: resources.image_pull_policy.clone(),
            requests: resources.requests.clone(),
            limits: resources.limits.clone(),
            volumes: resources.volumes.clone(),
            backoff_limit: resources.backoff_limit,
        }
    }

    /// Describe a dispatched task. Fails for closure payloads.
    pub fn from_task(task: &DispatchedTask, resources: &ResourceDefaults) -> anyhow::Result<Self> {
        let function = task.payload.function_name().ok_or_else(|| {
            anyhow!(
                "closure payloads cannot be shipped to a remote substrate; \
                 register the function and submit it by name"
            )
        })?;
        let mut descriptor = Self::new(function, task.payload.args.clone(), resources);
        descriptor.dep_results = task.dep_results.clone();
        Ok(descriptor)
    }
}

fn job_name() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("job-{}", &hex[..8])
}
