// src/exec/batch/mod.rs

//! Batch remote backend.
//!
//! - [`descriptor`]: what one remote unit is launched with.
//! - [`chunk`]: splitting descriptors by count and serialized size.
//! - [`substrate`]: the substrate contract and status classification.
//! - [`retry`]: bounded retries for transport failures.
//! - [`http`]: REST client and facade for the substrate contract.
//! - [`client`]: submit / poll / fetch / cleanup / wait_all.
//! - [`backend`]: the scheduler-facing `ExecutionBackend`.

pub mod backend;
pub mod chunk;
pub mod client;
pub mod descriptor;
pub mod http;
pub mod retry;
pub mod substrate;

pub use backend::BatchBackend;
pub use chunk::chunk_descriptors;
pub use client::BatchClient;
pub use descriptor::{JobDescriptor, RemoteId};
pub use http::HttpSubstrate;
pub use retry::RetryPolicy;
pub use substrate::{classify, JobStatus, RemoteState, Substrate};
