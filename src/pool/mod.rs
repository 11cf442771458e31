// src/pool/mod.rs

//! Worker-pool backend: warm workers draining FIFO queues, no dependency graph.
//!
//! - [`status`]: pool task ids and the records workers publish.
//! - [`worker`]: the in-process worker and the `WorkerEndpoint` trait.
//! - [`service`]: HTTP surface of a worker and its client.
//! - [`client`]: round-robin pool client polling the KV store.

pub mod client;
pub mod service;
pub mod status;
pub mod worker;

pub use client::WorkerPool;
pub use service::HttpWorker;
pub use status::{PoolTaskId, PoolTaskStatus, StatusEntry};
pub use worker::{Worker, WorkerEndpoint};
