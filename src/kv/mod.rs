// src/kv/mod.rs

//! Key-value status store.
//!
//! Workers publish `{status, result}` records here and the pool client polls
//! them. Each key is written by exactly one worker, so last-writer-wins per
//! key is enough.
//!
//! - [`memory`]: in-process store.
//! - [`http`]: client for a remote store.
//! - [`server`]: HTTP surface serving any store.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;

pub mod http;
pub mod memory;
pub mod server;

pub use http::HttpKvStore;
pub use memory::MemoryKvStore;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: Value) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Snapshot of every entry.
    async fn all(&self) -> Result<HashMap<String, Value>>;
}
