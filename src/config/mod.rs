// src/config/mod.rs

//! Configuration loading and validation for libpack.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Normalize paths and validate invariants such as distinct target
//!   output directories (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    default_config_path, load_and_validate, load_for_root, load_from_path, DEFAULT_CONFIG_FILE,
};
pub use model::{
    ConfigFile, ConfigOverrides, LibSection, ModuleOptions, ModuleSection, RawConfigFile,
    TargetConfig, TransformSection, TypesSection, WatchSection, WatchSettings,
};
pub use validate::DEFAULT_IGNORE;
