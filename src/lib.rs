// src/lib.rs

//! Task scheduling with dynamic dependencies over three execution substrates:
//! an in-process pool, a remote batch-job substrate, and a pool of warm
//! workers publishing to a key-value status store.
//!
//! Most callers only need [`Client`], built from a [`ConfigFile`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use jobdag::{Client, ConfigFile, FunctionRegistry, Payload};
//!
//! # async fn demo() -> jobdag::errors::Result<()> {
//! let client = Client::from_config(&ConfigFile::default(), Arc::new(FunctionRegistry::new()), None)?;
//! let job = client.run(Payload::value_fn(|_| Ok(1 + 2)), &[]).await?;
//! assert_eq!(client.wait_as::<i64>(&job, None).await?, 3);
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod kv;
pub mod logging;
pub mod pool;
pub mod types;

pub use client::{Client, Handle};
pub use config::ConfigFile;
pub use dag::{Function, Outcome, Payload, TaskContext};
pub use engine::{Dispatcher, DispatcherOptions};
pub use errors::JobdagError;
pub use exec::FunctionRegistry;
pub use types::{BackendKind, TaskId, TaskState};
