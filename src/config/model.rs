// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::BackendKind;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [scheduler]
/// backend = "batch"
/// pool_size = 4
///
/// [batch]
/// chunk_size = 50
/// substrate_url = "http://jobs.internal:8080"
///
/// [[batch.volumes]]
/// name = "data"
/// claim = "shared-data"
/// mount_path = "/data"
///
/// [pool]
/// workers = 3
/// kvs_url = "http://kvs.internal:5000"
///
/// [logging]
/// level = "debug"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: RawSchedulerSection,

    #[serde(default)]
    pub batch: RawBatchSection,

    #[serde(default)]
    pub pool: RawPoolSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSchedulerSection {
    /// `"local"` (default), `"batch"` or `"pool"`.
    #[serde(default)]
    pub backend: BackendKind,

    /// Thread count of the local backend.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_wait_poll_ms")]
    pub wait_poll_ms: u64,

    /// Applied by `wait` when the caller gives no timeout. Unset waits forever.
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_tick_ms() -> u64 {
    100
}

fn default_wait_poll_ms() -> u64 {
    20
}

impl Default for RawSchedulerSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            pool_size: default_pool_size(),
            tick_ms: default_tick_ms(),
            wait_poll_ms: default_wait_poll_ms(),
            default_timeout_secs: None,
        }
    }
}

/// `[batch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBatchSection {
    /// Descriptors per submission call.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Serialized-size ceiling of one submission call.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    #[serde(default = "default_batch_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Extra attempts for a wire call that failed at the transport level.
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Delete failed remote units too. Off by default so logs stay inspectable.
    #[serde(default)]
    pub delete_failed: bool,

    /// Base URL of the substrate's REST facade.
    #[serde(default)]
    pub substrate_url: Option<String>,

    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_image_pull_policy")]
    pub image_pull_policy: String,

    /// Failed attempts after which the substrate gives a unit up.
    #[serde(default = "default_backoff_limit")]
    pub backoff_limit: u32,

    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,

    /// Resource requests, e.g. `{ cpu = "500m", memory = "1Gi" }`.
    #[serde(default)]
    pub requests: BTreeMap<String, String>,

    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

fn default_chunk_size() -> usize {
    50
}

fn default_max_chunk_bytes() -> usize {
    1_000_000
}

fn default_batch_poll_interval_ms() -> u64 {
    1_000
}

fn default_transient_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_image() -> String {
    "jobs".to_string()
}

fn default_image_pull_policy() -> String {
    "Never".to_string()
}

fn default_backoff_limit() -> u32 {
    1
}

impl Default for RawBatchSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_chunk_bytes: default_max_chunk_bytes(),
            poll_interval_ms: default_batch_poll_interval_ms(),
            transient_retries: default_transient_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            delete_failed: false,
            substrate_url: None,
            image: default_image(),
            image_pull_policy: default_image_pull_policy(),
            backoff_limit: default_backoff_limit(),
            volumes: Vec::new(),
            requests: BTreeMap::new(),
            limits: BTreeMap::new(),
        }
    }
}

/// A persistent volume mounted into every remote unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub name: String,
    pub claim: String,
    pub mount_path: String,
}

/// `[pool]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPoolSection {
    /// In-process workers to start when `worker_urls` is empty.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Remote worker services; takes precedence over `workers`.
    #[serde(default)]
    pub worker_urls: Vec<String>,

    /// Remote KV status store; an in-memory store is used when unset.
    #[serde(default)]
    pub kvs_url: Option<String>,

    #[serde(default = "default_pool_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_workers() -> usize {
    2
}

fn default_pool_poll_interval_ms() -> u64 {
    50
}

impl Default for RawPoolSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            worker_urls: Vec::new(),
            kvs_url: None,
            poll_interval_ms: default_pool_poll_interval_ms(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
}

/// Validated configuration, threaded explicitly through constructors.
///
/// Build one with `ConfigFile::try_from(raw)` or
/// [`load_and_validate`](crate::config::load_and_validate).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerConfig,
    pub batch: BatchConfig,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub backend: BackendKind,
    pub pool_size: usize,
    pub tick: Duration,
    pub wait_poll: Duration,
    pub default_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub max_chunk_bytes: usize,
    pub poll_interval: Duration,
    pub transient_retries: u32,
    pub retry_backoff: Duration,
    pub delete_failed: bool,
    pub substrate_url: Option<String>,
    pub resources: ResourceDefaults,
}

/// What every remote unit is launched with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceDefaults {
    pub image: String,
    pub image_pull_policy: String,
    pub backoff_limit: u32,
    pub volumes: Vec<VolumeConfig>,
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub worker_urls: Vec<String>,
    pub kvs_url: Option<String>,
    pub poll_interval: Duration,
}

impl ConfigFile {
    /// Convert without checking; `TryFrom` validates first.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        let RawConfigFile {
            scheduler,
            batch,
            pool,
            logging,
        } = raw;

        Self {
            scheduler: SchedulerConfig {
                backend: scheduler.backend,
                pool_size: scheduler.pool_size,
                tick: Duration::from_millis(scheduler.tick_ms),
                wait_poll: Duration::from_millis(scheduler.wait_poll_ms),
                default_timeout: scheduler.default_timeout_secs.map(Duration::from_secs),
            },
            batch: BatchConfig {
                chunk_size: batch.chunk_size,
                max_chunk_bytes: batch.max_chunk_bytes,
                poll_interval: Duration::from_millis(batch.poll_interval_ms),
                transient_retries: batch.transient_retries,
                retry_backoff: Duration::from_millis(batch.retry_backoff_ms),
                delete_failed: batch.delete_failed,
                substrate_url: batch.substrate_url,
                resources: ResourceDefaults {
                    image: batch.image,
                    image_pull_policy: batch.image_pull_policy,
                    backoff_limit: batch.backoff_limit,
                    volumes: batch.volumes,
                    requests: batch.requests,
                    limits: batch.limits,
                },
            },
            pool: PoolConfig {
                workers: pool.workers,
                worker_urls: pool.worker_urls,
                kvs_url: pool.kvs_url,
                poll_interval: Duration::from_millis(pool.poll_interval_ms),
            },
            logging,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}
