// src/pool/status.rs

//! Identity and status records of worker-pool tasks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolTaskId(pub Uuid);

impl PoolTaskId {
    pub fn new() -> Self {
        PoolTaskId(Uuid::new_v4())
    }
}

impl Default for PoolTaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PoolTaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PoolTaskId(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolTaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl PoolTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PoolTaskStatus::Complete | PoolTaskStatus::Failed)
    }
}

/// What a worker publishes under the task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: PoolTaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEntry {
    pub fn pending() -> Self {
        Self::with_status(PoolTaskStatus::Pending)
    }

    pub fn running() -> Self {
        Self::with_status(PoolTaskStatus::Running)
    }

    pub fn complete(result: Value) -> Self {
        Self {
            status: PoolTaskStatus::Complete,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: PoolTaskStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }

    fn with_status(status: PoolTaskStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
        }
    }
}
