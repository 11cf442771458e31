// src/config/mod.rs

//! Configuration loading and validation for jobdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate sizes and intervals while converting to `ConfigFile` (`validate.rs`).
//!
//! There is no process-wide config: a `ConfigFile` is passed to whatever
//! constructor needs it.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_default, load_from_path};
pub use model::{
    BatchConfig, ConfigFile, LoggingConfig, PoolConfig, RawConfigFile, ResourceDefaults,
    SchedulerConfig, VolumeConfig,
};
