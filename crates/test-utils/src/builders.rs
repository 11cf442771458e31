#![allow(dead_code)]

use std::time::Duration;

use jobdag::config::{ConfigFile, RawConfigFile};
use jobdag::engine::DispatcherOptions;
use jobdag::types::BackendKind;

/// Builder for `ConfigFile` with test-friendly timings.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.scheduler.tick_ms = 5;
        config.scheduler.wait_poll_ms = 2;
        config.scheduler.default_timeout_secs = Some(10);
        config.batch.poll_interval_ms = 5;
        config.batch.retry_backoff_ms = 1;
        config.pool.poll_interval_ms = 5;
        Self { config }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.scheduler.backend = backend;
        self
    }

    pub fn pool_size(mut self, n: usize) -> Self {
        self.config.scheduler.pool_size = n;
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.batch.chunk_size = n;
        self
    }

    pub fn max_chunk_bytes(mut self, n: usize) -> Self {
        self.config.batch.max_chunk_bytes = n;
        self
    }

    pub fn transient_retries(mut self, n: u32) -> Self {
        self.config.batch.transient_retries = n;
        self
    }

    pub fn delete_failed(mut self, yes: bool) -> Self {
        self.config.batch.delete_failed = yes;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.pool.workers = n;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatcher timings for tests: fast ticks and a generous default timeout.
pub fn fast_options() -> DispatcherOptions {
    DispatcherOptions {
        tick: Duration::from_millis(5),
        wait_poll: Duration::from_millis(2),
        default_timeout: Some(Duration::from_secs(10)),
    }
}
