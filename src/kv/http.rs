// src/kv/http.rs

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::errors::{JobdagError, Result};
use crate::kv::server::PutRequest;
use crate::kv::KvStore;

/// Client for a store served by [`kv::server`](crate::kv::server).
#[derive(Debug, Clone)]
pub struct HttpKvStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpKvStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn store_url(&self, suffix: &str) -> String {
        format!("{}/store{}", self.base_url, suffix)
    }
}

#[async_trait]
impl KvStore for HttpKvStore {
    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let body = PutRequest {
            key: key.to_string(),
            value,
        };
        self.client
            .put(self.store_url(""))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        debug!(key, "published to remote kv store");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(self.store_url(""))
            .query(&[("key", key)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }

    async fn all(&self) -> Result<HashMap<String, Value>> {
        let response = self.client.get(self.store_url("/all")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(JobdagError::Other(anyhow!("kv store returned {status}")));
        }
        Ok(response.json().await?)
    }
}
