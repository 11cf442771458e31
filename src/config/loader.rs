// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable overriding the default config path.
pub const CONFIG_ENV: &str = "JOBDAG_CONFIG";

/// Load a configuration file and return the unvalidated `RawConfigFile`.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for the
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), "loaded config file");

    Ok(config)
}

/// Load a configuration file and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `$JOBDAG_CONFIG` if set, else `Jobdag.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    config_path_from(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

fn config_path_from(env_value: Option<PathBuf>) -> PathBuf {
    match env_value {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => PathBuf::from("Jobdag.toml"),
    }
}

/// Load the default config file, or fall back to built-in defaults if it
/// does not exist.
pub fn load_default() -> Result<ConfigFile> {
    let path = default_config_path();
    if path.exists() {
        load_and_validate(&path)
    } else {
        debug!(path = %path.display(), "no config file; using defaults");
        Ok(ConfigFile::default())
    }
}
