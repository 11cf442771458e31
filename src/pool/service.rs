// src/pool/service.rs

//! HTTP surface of one worker, and the matching client.
//!
//! - `POST /submit` with `{id?, function, args}` returns the task id
//! - `GET /status/{id}`
//! - `GET /result/{id}` (409 until the task is complete)
//! - `POST /close` drains the queue and stops the monitor
//!
//! Only named functions travel over the wire; the service resolves them in
//! its own registry.

use anyhow::anyhow;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::dag::Payload;
use crate::errors::{JobdagError, Result};
use crate::pool::status::{PoolTaskId, PoolTaskStatus};
use crate::pool::worker::{Worker, WorkerEndpoint};

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTask {
    /// Assigned by the caller; the service generates one when absent.
    #[serde(default)]
    pub id: Option<PoolTaskId>,
    pub function: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

pub fn router(worker: Worker) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/status/{id}", get(status))
        .route("/result/{id}", get(result))
        .route("/close", post(close))
        .with_state(worker)
}

type HandlerError = (StatusCode, String);

fn parse_id(raw: &str) -> std::result::Result<PoolTaskId, HandlerError> {
    raw.parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid task id '{raw}': {e}")))
}

async fn submit(
    State(worker): State<Worker>,
    Json(req): Json<SubmitTask>,
) -> std::result::Result<Json<PoolTaskId>, HandlerError> {
    let id = req.id.unwrap_or_default();
    worker
        .submit(id, Payload::call(req.function, req.args))
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok(Json(id))
}

async fn status(
    State(worker): State<Worker>,
    Path(id): Path<String>,
) -> std::result::Result<Json<PoolTaskStatus>, HandlerError> {
    let id = parse_id(&id)?;
    worker
        .status(id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown task {id}")))
}

async fn result(
    State(worker): State<Worker>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Value>, HandlerError> {
    let id = parse_id(&id)?;
    let entry = worker
        .entry(id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown task {id}")))?;
    match (entry.status, entry.result) {
        (PoolTaskStatus::Complete, Some(value)) => Ok(Json(value)),
        (PoolTaskStatus::Failed, _) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            entry.error.unwrap_or_default(),
        )),
        (status, _) => Err((StatusCode::CONFLICT, format!("task {id} is {status:?}"))),
    }
}

async fn close(State(worker): State<Worker>) -> StatusCode {
    tokio::spawn(async move {
        if let Err(e) = worker.close().await {
            warn!(error = %e, "worker close failed");
        }
    });
    StatusCode::ACCEPTED
}

/// Client for a worker served by [`router`].
#[derive(Debug, Clone)]
pub struct HttpWorker {
    base_url: String,
    client: reqwest::Client,
}

impl HttpWorker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Status straight from the worker rather than the shared store.
    pub async fn status(&self, id: PoolTaskId) -> Result<PoolTaskStatus> {
        let response = self
            .client
            .get(format!("{}/status/{id}", self.base_url))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(JobdagError::TaskNotFound(id.to_string()));
        }
        Ok(response.error_for_status()?.json().await?)
    }
}

#[async_trait]
impl WorkerEndpoint for HttpWorker {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn submit(&self, id: PoolTaskId, payload: Payload) -> Result<()> {
        let function = payload.function_name().ok_or_else(|| {
            JobdagError::Other(anyhow!(
                "closure payloads cannot be sent to a remote worker; register the function and submit it by name"
            ))
        })?;
        let body = SubmitTask {
            id: Some(id),
            function: function.to_string(),
            args: payload.args.clone(),
        };
        let assigned: PoolTaskId = self
            .client
            .post(format!("{}/submit", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if assigned != id {
            return Err(JobdagError::Other(anyhow!(
                "worker {} assigned {assigned} instead of {id}",
                self.base_url
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client
            .post(format!("{}/close", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        info!(worker = %self.base_url, "requested worker shutdown");
        Ok(())
    }
}
