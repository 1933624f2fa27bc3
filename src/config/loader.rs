// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a task file without semantic validation.
///
/// Use [`load_and_validate`] unless you need the raw form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a task file and validate it:
///
/// - at least one task, sane `[engine]` values
/// - every `after` entry names another known task
/// - the dependency graph is acyclic
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Taskwave.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskwave.toml")
}
