// src/exec/batch/http.rs

//! REST binding of the substrate contract.
//!
//! | call      | route                     |
//! |-----------|---------------------------|
//! | submit    | `POST /jobs`              |
//! | status    | `POST /jobs/status`       |
//! | result    | `GET /jobs/{id}/result`   |
//! | logs      | `GET /jobs/{id}/logs`     |
//! | delete    | `DELETE /jobs/{id}`       |
//!
//! [`HttpSubstrate`] is the client side. [`router`] serves any [`Substrate`]
//! over the same routes, which is how a cluster-side facade (or a test) puts
//! a substrate on the wire.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{JobdagError, Result};
use crate::exec::batch::descriptor::{JobDescriptor, RemoteId};
use crate::exec::batch::substrate::{JobStatus, Substrate};

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub jobs: Vec<JobDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub ids: Vec<RemoteId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusRequest {
    pub ids: Vec<RemoteId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub statuses: HashMap<RemoteId, JobStatus>,
}

/// Substrate client over the REST facade.
#[derive(Debug, Clone)]
pub struct HttpSubstrate {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSubstrate {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// 5xx stays an `HttpError` (retried); 4xx is permanent.
async fn checked(response: reqwest::Response, call: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_client_error() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        warn!(call, %status, body = %body, "substrate rejected request");
        return Err(JobdagError::Other(anyhow!("substrate {call} returned {status}: {body}")));
    }
    Ok(response.error_for_status()?)
}

#[async_trait]
impl Substrate for HttpSubstrate {
    async fn submit(&self, chunk: &[JobDescriptor]) -> Result<Vec<RemoteId>> {
        let body = SubmitRequest {
            jobs: chunk.to_vec(),
        };
        let response = self.client.post(self.url("/jobs")).json(&body).send().await?;
        let parsed: SubmitResponse = checked(response, "submit").await?.json().await?;
        debug!(submitted = parsed.ids.len(), "substrate accepted chunk");
        Ok(parsed.ids)
    }

    async fn status(&self, ids: &[RemoteId]) -> Result<HashMap<RemoteId, JobStatus>> {
        let body = StatusRequest { ids: ids.to_vec() };
        let response = self
            .client
            .post(self.url("/jobs/status"))
            .json(&body)
            .send()
            .await?;
        let parsed: StatusResponse = checked(response, "status").await?.json().await?;
        Ok(parsed.statuses)
    }

    async fn result(&self, id: &RemoteId) -> Result<Value> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{id}/result")))
            .send()
            .await?;
        Ok(checked(response, "result").await?.json().await?)
    }

    async fn logs(&self, id: &RemoteId) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{id}/logs")))
            .send()
            .await?;
        Ok(checked(response, "logs").await?.text().await?)
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/jobs/{id}")))
            .send()
            .await?;
        checked(response, "delete").await?;
        Ok(())
    }
}

// ── Facade ────────────────────────────────────────────────────

type Shared = Arc<dyn Substrate>;

/// Serve `substrate` over the REST routes above.
pub fn router(substrate: Shared) -> Router {
    Router::new()
        .route("/jobs", post(submit_jobs))
        .route("/jobs/status", post(job_statuses))
        .route("/jobs/{id}", delete(delete_job))
        .route("/jobs/{id}/result", get(job_result))
        .route("/jobs/{id}/logs", get(job_logs))
        .with_state(substrate)
}

fn error_response(e: JobdagError) -> (StatusCode, String) {
    let status = match &e {
        JobdagError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        JobdagError::ConfigError(_) | JobdagError::PayloadTooLarge { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, e.to_string())
}

async fn submit_jobs(
    State(substrate): State<Shared>,
    Json(req): Json<SubmitRequest>,
) -> std::result::Result<Json<SubmitResponse>, (StatusCode, String)> {
    let ids = substrate.submit(&req.jobs).await.map_err(error_response)?;
    Ok(Json(SubmitResponse { ids }))
}

async fn job_statuses(
    State(substrate): State<Shared>,
    Json(req): Json<StatusRequest>,
) -> std::result::Result<Json<StatusResponse>, (StatusCode, String)> {
    let statuses = substrate.status(&req.ids).await.map_err(error_response)?;
    Ok(Json(StatusResponse { statuses }))
}

async fn job_result(
    State(substrate): State<Shared>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Value>, (StatusCode, String)> {
    let value = substrate.result(&RemoteId(id)).await.map_err(error_response)?;
    Ok(Json(value))
}

async fn job_logs(
    State(substrate): State<Shared>,
    Path(id): Path<String>,
) -> std::result::Result<String, (StatusCode, String)> {
    substrate.logs(&RemoteId(id)).await.map_err(error_response)
}

async fn delete_job(
    State(substrate): State<Shared>,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, (StatusCode, String)> {
    substrate.delete(&RemoteId(id)).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
