// src/kv/server.rs

//! HTTP surface of the status store.
//!
//! - `PUT /store` with `{key, value}`
//! - `GET /store?key=<key>` (404 if absent)
//! - `GET /store/all`

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::info;

use crate::errors::Result;
use crate::kv::KvStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: String,
}

type Shared = Arc<dyn KvStore>;

pub fn router(store: Shared) -> Router {
    Router::new()
        .route("/store", get(get_value).put(put_value))
        .route("/store/all", get(all_values))
        .with_state(store)
}

/// Serve `store` on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, store: Shared) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "kv store listening");
    axum::serve(listener, router(store)).await?;
    Ok(())
}

async fn put_value(
    State(store): State<Shared>,
    Json(req): Json<PutRequest>,
) -> std::result::Result<StatusCode, (StatusCode, String)> {
    store
        .put(&req.key, req.value)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_value(
    State(store): State<Shared>,
    Query(q): Query<KeyQuery>,
) -> std::result::Result<Json<Value>, (StatusCode, String)> {
    match store.get(&q.key).await {
        Ok(Some(value)) => Ok(Json(value)),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("no value for key '{}'", q.key))),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn all_values(
    State(store): State<Shared>,
) -> std::result::Result<Json<HashMap<String, Value>>, (StatusCode, String)> {
    store
        .all()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
