// src/client.rs

//! The caller-facing API: `run`, `map`, `starmap`, `wait`, `check`.
//!
//! One `Client` fronts whichever backend `[scheduler].backend` selects. The
//! local and batch backends share the dependency-graph dispatcher; the pool
//! backend has no graph, so dependencies are rejected there.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::config::ConfigFile;
use crate::dag::{Function, Payload};
use crate::engine::{Dispatcher, DispatcherOptions};
use crate::errors::{JobdagError, Result};
use crate::exec::batch::{BatchBackend, BatchClient, HttpSubstrate, Substrate};
use crate::exec::{ExecutionBackend, FunctionRegistry, LocalBackend};
use crate::pool::{PoolTaskId, WorkerPool};
use crate::types::{BackendKind, TaskId};

/// Handle returned by `run`; what `wait` and `check` take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Task(TaskId),
    Pool(PoolTaskId),
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Task(id) => write!(f, "{id}"),
            Handle::Pool(id) => write!(f, "{id}"),
        }
    }
}

enum Engine {
    Graph(Dispatcher),
    Pool(WorkerPool),
}

pub struct Client {
    engine: Engine,
    kind: BackendKind,
    default_timeout: Option<Duration>,
}

impl Client {
    /// Build the backend named by `cfg.scheduler.backend`.
    ///
    /// `substrate` overrides `[batch].substrate_url` for the batch backend.
    /// Must be called inside a Tokio runtime.
    pub fn from_config(
        cfg: &ConfigFile,
        registry: Arc<FunctionRegistry>,
        substrate: Option<Arc<dyn Substrate>>,
    ) -> Result<Self> {
        let kind = cfg.scheduler.backend;
        let options = DispatcherOptions::from(&cfg.scheduler);

        let engine = match kind {
            BackendKind::Local => {
                let backend: Arc<dyn ExecutionBackend> =
                    Arc::new(LocalBackend::new(cfg.scheduler.pool_size, registry)?);
                Engine::Graph(Dispatcher::start(backend, options))
            }
            BackendKind::Batch => {
                let substrate = match (substrate, &cfg.batch.substrate_url) {
                    (Some(substrate), _) => substrate,
                    (None, Some(url)) => Arc::new(HttpSubstrate::new(url.clone())) as Arc<dyn Substrate>,
                    (None, None) => {
                        return Err(JobdagError::ConfigError(
                            "batch backend needs [batch].substrate_url or an explicit substrate"
                                .to_string(),
                        ));
                    }
                };
                let backend: Arc<dyn ExecutionBackend> =
                    Arc::new(BatchBackend::new(BatchClient::new(substrate, &cfg.batch)));
                Engine::Graph(Dispatcher::start(backend, options))
            }
            BackendKind::Pool => Engine::Pool(WorkerPool::from_config(&cfg.pool, registry)?),
        };

        info!(backend = ?kind, "client ready");
        Ok(Self {
            engine,
            kind,
            default_timeout: cfg.scheduler.default_timeout,
        })
    }

    /// Wrap an already started dispatcher.
    pub fn with_dispatcher(dispatcher: Dispatcher, kind: BackendKind) -> Self {
        Self {
            engine: Engine::Graph(dispatcher),
            kind,
            default_timeout: None,
        }
    }

    pub fn with_pool(pool: WorkerPool) -> Self {
        Self {
            engine: Engine::Pool(pool),
            kind: BackendKind::Pool,
            default_timeout: None,
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.kind
    }

    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        match &self.engine {
            Engine::Graph(d) => Some(d),
            Engine::Pool(_) => None,
        }
    }

    pub fn pool(&self) -> Option<&WorkerPool> {
        match &self.engine {
            Engine::Pool(p) => Some(p),
            Engine::Graph(_) => None,
        }
    }

    pub async fn run(&self, payload: Payload, deps: &[Handle]) -> Result<Handle> {
        match &self.engine {
            Engine::Graph(d) => Ok(Handle::Task(d.run(payload, task_ids(deps)?)?)),
            Engine::Pool(p) => {
                reject_pool_deps(deps)?;
                Ok(Handle::Pool(p.run(payload).await?))
            }
        }
    }

    /// One task per item; results of `wait_all` come back in item order.
    pub async fn map(&self, function: &Function, items: Vec<Value>, deps: &[Handle]) -> Result<Vec<Handle>> {
        match &self.engine {
            Engine::Graph(d) => Ok(d
                .map(function, items, &task_ids(deps)?)?
                .into_iter()
                .map(Handle::Task)
                .collect()),
            Engine::Pool(p) => {
                reject_pool_deps(deps)?;
                Ok(p.map(function, items).await?.into_iter().map(Handle::Pool).collect())
            }
        }
    }

    /// Like `map`, with each row unpacked as the argument list.
    pub async fn starmap(
        &self,
        function: &Function,
        rows: Vec<Vec<Value>>,
        deps: &[Handle],
    ) -> Result<Vec<Handle>> {
        match &self.engine {
            Engine::Graph(d) => Ok(d
                .starmap(function, rows, &task_ids(deps)?)?
                .into_iter()
                .map(Handle::Task)
                .collect()),
            Engine::Pool(p) => {
                reject_pool_deps(deps)?;
                Ok(p.starmap(function, rows).await?.into_iter().map(Handle::Pool).collect())
            }
        }
    }

    pub async fn wait(&self, handle: &Handle, timeout: Option<Duration>) -> Result<Value> {
        let timeout = timeout.or(self.default_timeout);
        match (&self.engine, handle) {
            (Engine::Graph(d), Handle::Task(id)) => d.wait(*id, timeout).await,
            (Engine::Pool(p), Handle::Pool(id)) => p.wait_one(*id, timeout).await,
            _ => Err(foreign_handle(handle)),
        }
    }

    pub async fn wait_as<T: DeserializeOwned>(&self, handle: &Handle, timeout: Option<Duration>) -> Result<T> {
        let value = self.wait(handle, timeout).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Wait for all handles; raises one `Aggregate` naming every failed handle.
    pub async fn wait_all(&self, handles: &[Handle], timeout: Option<Duration>) -> Result<Vec<Value>> {
        let timeout = timeout.or(self.default_timeout);
        match &self.engine {
            Engine::Graph(d) => d.wait_all(&task_ids(handles)?, timeout).await,
            Engine::Pool(p) => {
                let ids = handles
                    .iter()
                    .map(|h| match h {
                        Handle::Pool(id) => Ok(*id),
                        other => Err(foreign_handle(other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                p.wait(&ids, timeout).await
            }
        }
    }

    pub async fn check(&self, handle: &Handle) -> Result<bool> {
        match (&self.engine, handle) {
            (Engine::Graph(d), Handle::Task(id)) => Ok(d.check(*id)),
            (Engine::Pool(p), Handle::Pool(id)) => p.check(*id).await,
            _ => Err(foreign_handle(handle)),
        }
    }

    /// Stop dispatching (graph backends) or close every worker (pool).
    pub async fn shutdown(&self) -> Result<()> {
        match &self.engine {
            Engine::Graph(d) => {
                d.stop().await;
                Ok(())
            }
            Engine::Pool(p) => p.close().await,
        }
    }
}

fn task_ids(handles: &[Handle]) -> Result<Vec<TaskId>> {
    handles
        .iter()
        .map(|h| match h {
            Handle::Task(id) => Ok(*id),
            other => Err(foreign_handle(other)),
        })
        .collect()
}

fn reject_pool_deps(deps: &[Handle]) -> Result<()> {
    if deps.is_empty() {
        Ok(())
    } else {
        Err(JobdagError::ConfigError(
            "the pool backend has no dependency graph; submit without deps or use the local or batch backend"
                .to_string(),
        ))
    }
}

fn foreign_handle(handle: &Handle) -> JobdagError {
    JobdagError::TaskNotFound(format!("{handle} does not belong to this client's backend"))
}
