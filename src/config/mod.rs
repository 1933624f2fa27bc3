// src/config/mod.rs

//! Configuration for the engine and for task files.
//!
//! - `model.rs`: the TOML-backed data model and [`EngineConfig`].
//! - `loader.rs`: reading a task file from disk.
//! - `validate.rs`: dependency and sanity checks turning a
//!   [`RawConfigFile`] into a [`ConfigFile`].
//! - `register.rs`: registering a validated file's tasks on an engine.

pub mod loader;
pub mod model;
pub mod register;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, EngineConfig, RawConfigFile, TaskConfig};
pub use register::register_tasks;
