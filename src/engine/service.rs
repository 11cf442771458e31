// src/engine/service.rs

//! HTTP jobs service over a [`Dispatcher`], and the matching client.
//!
//! - `POST /enqueue` with `{function, args, deps}` returns the new task id
//! - `POST /map` with `{function, items, deps}` returns one id per item
//! - `GET /wait/{id}?timeout_ms=` blocks until the task resolves
//! - `GET /check/{id}`
//! - `GET /dump` returns the sizes of the store's index sets
//! - `POST /shutdown` stops the scheduler loop
//!
//! Tasks are named functions resolved in the dispatcher's registry; closures
//! cannot cross the wire.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dag::{Function, Payload, StoreStats};
use crate::engine::dispatcher::Dispatcher;
use crate::errors::{JobdagError, Result};
use crate::types::TaskId;

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub function: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub deps: Vec<TaskId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MapRequest {
    pub function: String,
    pub items: Vec<Value>,
    #[serde(default)]
    pub deps: Vec<TaskId>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WaitQuery {
    /// Falls back to the dispatcher's default timeout when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

type Shared = Arc<Dispatcher>;
type HandlerError = (StatusCode, String);

pub fn router(dispatcher: Shared) -> Router {
    Router::new()
        .route("/enqueue", post(enqueue))
        .route("/map", post(map))
        .route("/wait/{id}", get(wait))
        .route("/check/{id}", get(check))
        .route("/dump", get(dump))
        .route("/shutdown", post(shutdown))
        .with_state(dispatcher)
}

/// Per-task failures keep their own codes so the client can rebuild them.
fn error_response(e: JobdagError) -> HandlerError {
    match e {
        JobdagError::TaskNotFound(id) => (StatusCode::NOT_FOUND, id),
        JobdagError::ExecutionFailed { message, .. } => (StatusCode::UNPROCESSABLE_ENTITY, message),
        JobdagError::DependencyFailed { dependency, .. } => (StatusCode::FAILED_DEPENDENCY, dependency),
        e @ JobdagError::Timeout { .. } => (StatusCode::REQUEST_TIMEOUT, e.to_string()),
        e @ JobdagError::ConfigError(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        e => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn enqueue(
    State(dispatcher): State<Shared>,
    Json(req): Json<EnqueueRequest>,
) -> std::result::Result<Json<TaskId>, HandlerError> {
    let id = dispatcher
        .run(Payload::call(req.function, req.args), req.deps)
        .map_err(error_response)?;
    Ok(Json(id))
}

async fn map(
    State(dispatcher): State<Shared>,
    Json(req): Json<MapRequest>,
) -> std::result::Result<Json<Vec<TaskId>>, HandlerError> {
    let ids = dispatcher
        .map(&Function::named(req.function), req.items, &req.deps)
        .map_err(error_response)?;
    debug!(count = ids.len(), "mapped over http");
    Ok(Json(ids))
}

async fn wait(
    State(dispatcher): State<Shared>,
    Path(id): Path<u64>,
    Query(query): Query<WaitQuery>,
) -> std::result::Result<Json<Value>, HandlerError> {
    let timeout = query.timeout_ms.map(Duration::from_millis);
    dispatcher
        .wait(TaskId(id), timeout)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn check(State(dispatcher): State<Shared>, Path(id): Path<u64>) -> Json<bool> {
    Json(dispatcher.check(TaskId(id)))
}

async fn dump(State(dispatcher): State<Shared>) -> Json<StoreStats> {
    Json(dispatcher.stats())
}

async fn shutdown(State(dispatcher): State<Shared>) -> StatusCode {
    info!("shutdown requested over http");
    dispatcher.stop().await;
    StatusCode::ACCEPTED
}

/// Client for a dispatcher served by [`router`].
#[derive(Debug, Clone)]
pub struct JobsClient {
    base_url: String,
    client: reqwest::Client,
}

impl JobsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn enqueue(&self, function: &str, args: Vec<Value>, deps: &[TaskId]) -> Result<TaskId> {
        let body = EnqueueRequest {
            function: function.to_string(),
            args,
            deps: deps.to_vec(),
        };
        let response = self.client.post(self.url("/enqueue")).json(&body).send().await?;
        Ok(rejected(response).await?.json().await?)
    }

    pub async fn map(&self, function: &str, items: Vec<Value>, deps: &[TaskId]) -> Result<Vec<TaskId>> {
        let body = MapRequest {
            function: function.to_string(),
            items,
            deps: deps.to_vec(),
        };
        let response = self.client.post(self.url("/map")).json(&body).send().await?;
        Ok(rejected(response).await?.json().await?)
    }

    /// Wait on the server side; failures come back as the same error kinds
    /// a local `Dispatcher::wait` returns.
    pub async fn wait(&self, id: TaskId, timeout: Option<Duration>) -> Result<Value> {
        let started = Instant::now();
        let mut request = self.client.get(self.url(&format!("/wait/{}", id.0)));
        if let Some(timeout) = timeout {
            request = request.query(&WaitQuery {
                timeout_ms: Some(timeout.as_millis() as u64),
            });
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();
        let task = id.to_string();
        Err(match status {
            StatusCode::NOT_FOUND => JobdagError::TaskNotFound(task),
            StatusCode::UNPROCESSABLE_ENTITY => JobdagError::ExecutionFailed { task, message: body },
            StatusCode::FAILED_DEPENDENCY => JobdagError::DependencyFailed {
                task,
                dependency: body,
            },
            StatusCode::REQUEST_TIMEOUT => JobdagError::Timeout {
                waited: started.elapsed(),
                pending: 1,
            },
            _ => JobdagError::Other(anyhow!("jobs service wait returned {status}: {body}")),
        })
    }

    pub async fn wait_as<T: DeserializeOwned>(&self, id: TaskId, timeout: Option<Duration>) -> Result<T> {
        let value = self.wait(id, timeout).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn check(&self, id: TaskId) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!("/check/{}", id.0)))
            .send()
            .await?;
        Ok(rejected(response).await?.json().await?)
    }

    pub async fn dump(&self) -> Result<StoreStats> {
        let response = self.client.get(self.url("/dump")).send().await?;
        Ok(rejected(response).await?.json().await?)
    }

    pub async fn shutdown(&self) -> Result<()> {
        let response = self.client.post(self.url("/shutdown")).send().await?;
        rejected(response).await?;
        info!(service = %self.base_url, "jobs service stopped");
        Ok(())
    }
}

/// 404 becomes `TaskNotFound`, any other 4xx a permanent error.
async fn rejected(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_client_error() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        warn!(%status, body = %body, "jobs service rejected request");
        if status == StatusCode::NOT_FOUND {
            return Err(JobdagError::TaskNotFound(body));
        }
        return Err(JobdagError::Other(anyhow!("jobs service returned {status}: {body}")));
    }
    Ok(response.error_for_status()?)
}
