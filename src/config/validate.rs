// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{JobdagError, Result};
use crate::types::BackendKind;

/// Smallest accepted per-call byte ceiling.
pub const MIN_CHUNK_BYTES: usize = 1024;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = JobdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_scheduler(cfg)?;
    validate_batch(cfg)?;
    validate_pool(cfg)?;
    validate_logging(cfg)?;
    Ok(())
}

fn nonzero(value: u64, key: &str) -> Result<()> {
    if value == 0 {
        return Err(JobdagError::ConfigError(format!(
            "{key} must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.scheduler;
    nonzero(s.pool_size as u64, "[scheduler].pool_size")?;
    nonzero(s.tick_ms, "[scheduler].tick_ms")?;
    nonzero(s.wait_poll_ms, "[scheduler].wait_poll_ms")?;
    if let Some(secs) = s.default_timeout_secs {
        nonzero(secs, "[scheduler].default_timeout_secs")?;
    }
    Ok(())
}

fn validate_batch(cfg: &RawConfigFile) -> Result<()> {
    let b = &cfg.batch;
    nonzero(b.chunk_size as u64, "[batch].chunk_size")?;
    nonzero(b.poll_interval_ms, "[batch].poll_interval_ms")?;
    nonzero(b.backoff_limit as u64, "[batch].backoff_limit")?;

    if b.max_chunk_bytes < MIN_CHUNK_BYTES {
        return Err(JobdagError::ConfigError(format!(
            "[batch].max_chunk_bytes must be >= {MIN_CHUNK_BYTES} (got {})",
            b.max_chunk_bytes
        )));
    }

    if cfg.scheduler.backend == BackendKind::Batch && b.image.trim().is_empty() {
        return Err(JobdagError::ConfigError(
            "[batch].image must not be empty".to_string(),
        ));
    }

    for volume in &b.volumes {
        if volume.name.is_empty() || volume.claim.is_empty() || volume.mount_path.is_empty() {
            return Err(JobdagError::ConfigError(format!(
                "[[batch.volumes]] entry {:?} needs name, claim and mount_path",
                volume.name
            )));
        }
    }
    Ok(())
}

fn validate_pool(cfg: &RawConfigFile) -> Result<()> {
    let p = &cfg.pool;
    nonzero(p.poll_interval_ms, "[pool].poll_interval_ms")?;
    if p.worker_urls.is_empty() {
        nonzero(p.workers as u64, "[pool].workers")?;
    } else if p.kvs_url.is_none() {
        return Err(JobdagError::ConfigError(
            "[pool].worker_urls requires [pool].kvs_url so remote workers can publish status"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(cfg: &RawConfigFile) -> Result<()> {
    if let Some(level) = &cfg.logging.level {
        if crate::logging::parse_level_str(level).is_none() {
            return Err(JobdagError::ConfigError(format!(
                "[logging].level: unknown level '{level}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.scheduler.backend, BackendKind::Local);
        assert_eq!(cfg.batch.chunk_size, 50);
        assert_eq!(cfg.batch.resources.backoff_limit, 1);
        assert!(!cfg.batch.delete_failed);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = parse("[batch]\nchunk_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("[batch].chunk_size"));
    }

    #[test]
    fn tiny_byte_ceiling_is_rejected() {
        let err = parse("[batch]\nmax_chunk_bytes = 10\n").unwrap_err();
        assert!(matches!(err, JobdagError::ConfigError(_)));
    }

    #[test]
    fn unknown_backend_fails_to_parse() {
        assert!(parse("[scheduler]\nbackend = \"cloud\"\n").is_err());
    }

    #[test]
    fn bad_log_level_is_rejected() {
        assert!(parse("[logging]\nlevel = \"loud\"\n").is_err());
    }
}
