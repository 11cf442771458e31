// src/engine/mod.rs

//! Scheduler engine.
//!
//! - [`resolver`] turns one execution outcome into a store transition.
//! - [`sink`] is the shared store handle and the completion callback.
//! - [`dispatcher`] runs the scheduler loop and serves the client operations.
//! - [`service`] puts a dispatcher behind HTTP for named tasks.

pub mod dispatcher;
pub mod resolver;
pub mod service;
pub mod sink;

pub use dispatcher::{Dispatcher, DispatcherOptions};
pub use resolver::{resolve, Resolution};
pub use service::JobsClient;
pub use sink::{CompletionSink, SharedStore};
